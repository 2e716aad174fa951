// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Tempo and swing arithmetic, plus the time sources the scheduler reads "now" from.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// The slowest tempo the clock accepts.
pub const MIN_TEMPO_BPM: f64 = 30.0;

/// The fastest tempo the clock accepts.
pub const MAX_TEMPO_BPM: f64 = 300.0;

/// The default tempo.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// The default number of steps in a bar (16th notes in 4/4).
pub const DEFAULT_STEPS_PER_BAR: usize = 16;

/// Beats in a bar. Steps per beat is derived from this.
pub const BEATS_PER_BAR: usize = 4;

/// Tempo, swing and grid resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSettings {
    tempo_bpm: f64,
    swing_percent: f64,
    steps_per_bar: usize,
}

impl ClockSettings {
    /// Creates new clock settings. Tempo and swing are clamped into range.
    pub fn new(tempo_bpm: f64, swing_percent: f64, steps_per_bar: usize) -> ClockSettings {
        let mut settings = ClockSettings {
            tempo_bpm: DEFAULT_TEMPO_BPM,
            swing_percent: 0.0,
            steps_per_bar: steps_per_bar.max(BEATS_PER_BAR),
        };
        settings.set_tempo(tempo_bpm);
        settings.set_swing(swing_percent);
        settings
    }

    /// Gets the tempo in beats per minute.
    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    /// Gets the swing amount, 0 to 100.
    pub fn swing_percent(&self) -> f64 {
        self.swing_percent
    }

    /// Gets the number of steps in a bar.
    pub fn steps_per_bar(&self) -> usize {
        self.steps_per_bar
    }

    /// Gets the number of steps in a beat.
    pub fn steps_per_beat(&self) -> usize {
        (self.steps_per_bar / BEATS_PER_BAR).max(1)
    }

    /// Sets the tempo, clamping it to [30, 300]. Returns the tempo actually applied.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.tempo_bpm = if bpm.is_nan() {
            DEFAULT_TEMPO_BPM
        } else {
            bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM)
        };
        self.tempo_bpm
    }

    /// Sets the swing, clamping it to [0, 100]. Returns the swing actually applied.
    pub fn set_swing(&mut self, percent: f64) -> f64 {
        self.swing_percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.swing_percent
    }

    /// The length of one step in seconds: 60 / (tempo * steps per beat).
    pub fn step_duration_secs(&self) -> f64 {
        60.0 / (self.tempo_bpm * self.steps_per_beat() as f64)
    }

    /// The length of one step.
    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(self.step_duration_secs())
    }

    /// The swing offset in seconds for the given step. Only odd steps are delayed.
    pub fn swing_delay_secs(&self, step_index: usize) -> f64 {
        if self.swing_percent == 0.0 || step_index % 2 == 0 {
            return 0.0;
        }

        (self.swing_percent / 100.0) * 0.5 * self.step_duration_secs()
    }

    /// The swing offset for the given step.
    pub fn swing_delay(&self, step_index: usize) -> Duration {
        Duration::from_secs_f64(self.swing_delay_secs(step_index))
    }
}

impl Default for ClockSettings {
    fn default() -> Self {
        ClockSettings::new(DEFAULT_TEMPO_BPM, 0.0, DEFAULT_STEPS_PER_BAR)
    }
}

/// A monotonic source of "now". Times are offsets from the source's own origin.
pub trait TimeSource: Send + Sync {
    /// The current time.
    fn now(&self) -> Duration;
}

/// Wall clock time, measured from when the clock was created.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a new system clock with its origin at the current instant.
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a manual clock starting at zero.
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, to: Duration) {
        *self.now.lock() = to;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{ClockSettings, ManualClock, TimeSource};

    #[test]
    fn test_step_duration() {
        for tempo in 30..=300 {
            let settings = ClockSettings::new(tempo as f64, 0.0, 16);
            assert_eq!(60.0 / (tempo as f64 * 4.0), settings.step_duration_secs());
        }

        assert_eq!(
            Duration::from_millis(125),
            ClockSettings::new(120.0, 0.0, 16).step_duration()
        );
    }

    #[test]
    fn test_steps_per_beat_follows_grid() {
        assert_eq!(4, ClockSettings::new(120.0, 0.0, 16).steps_per_beat());
        assert_eq!(8, ClockSettings::new(120.0, 0.0, 32).steps_per_beat());
        assert_eq!(0.0625, ClockSettings::new(120.0, 0.0, 32).step_duration_secs());
    }

    #[test]
    fn test_tempo_clamps() {
        let mut settings = ClockSettings::default();
        assert_eq!(30.0, settings.set_tempo(5.0));
        assert_eq!(300.0, settings.set_tempo(1000.0));
        assert_eq!(174.0, settings.set_tempo(174.0));
        assert_eq!(30.0, ClockSettings::new(-10.0, 0.0, 16).tempo_bpm());
    }

    #[test]
    fn test_swing_clamps() {
        let mut settings = ClockSettings::default();
        assert_eq!(0.0, settings.set_swing(-1.0));
        assert_eq!(100.0, settings.set_swing(150.0));
        assert_eq!(42.0, settings.set_swing(42.0));
    }

    #[test]
    fn test_swing_delay_only_on_odd_steps() {
        let settings = ClockSettings::new(120.0, 50.0, 16);
        let max = 0.5 * settings.step_duration_secs();
        for step in 0..16 {
            let delay = settings.swing_delay_secs(step);
            if step % 2 == 0 {
                assert_eq!(0.0, delay);
            } else {
                assert!(delay > 0.0 && delay <= max);
            }
        }
    }

    #[test]
    fn test_swing_delay_scales_linearly() {
        let full = ClockSettings::new(120.0, 100.0, 16);
        assert_eq!(0.5 * full.step_duration_secs(), full.swing_delay_secs(1));

        for swing in [0.0, 10.0, 25.0, 50.0, 75.0, 100.0] {
            let settings = ClockSettings::new(120.0, swing, 16);
            let expected = swing / 100.0 * full.swing_delay_secs(1);
            assert!((settings.swing_delay_secs(3) - expected).abs() < 1e-12);
        }

        assert_eq!(0.0, ClockSettings::new(120.0, 0.0, 16).swing_delay_secs(1));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(Duration::ZERO, clock.now());
        clock.advance(Duration::from_millis(25));
        clock.advance(Duration::from_millis(25));
        assert_eq!(Duration::from_millis(50), clock.now());
        clock.set(Duration::from_secs(2));
        assert_eq!(Duration::from_secs(2), clock.now());
    }
}
