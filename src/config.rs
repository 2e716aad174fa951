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
use std::{collections::HashSet, path::Path, sync::Arc, time::Duration};

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::info;

use crate::{
    clock::{
        ClockSettings, SystemClock, TimeSource, BEATS_PER_BAR, DEFAULT_STEPS_PER_BAR,
        DEFAULT_TEMPO_BPM,
    },
    pattern::PatternStore,
    presets::{apply_preset, BuiltinPresets, PresetLoader},
    scheduler::{LookaheadTiming, Scheduler, DEFAULT_POLL_INTERVAL, DEFAULT_SCHEDULE_AHEAD},
};

pub use self::error::ConfigError;

mod error;

/// The tracks configured when none are given.
pub const DEFAULT_TRACKS: [&str; 6] = ["kick", "snare", "hihat", "clap", "bass", "synth"];

/// The banks configured when none are given.
pub const DEFAULT_BANKS: [&str; 4] = ["A", "B", "C", "D"];

/// A YAML representation of the sequencer configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SequencerConfig {
    /// The starting tempo in BPM.
    tempo_bpm: Option<f64>,

    /// The starting swing amount, 0 to 100.
    swing_percent: Option<f64>,

    /// Steps in one bar. Must be a multiple of 4.
    steps_per_bar: Option<usize>,

    /// How far ahead of now dispatches are armed, e.g. "100ms".
    schedule_ahead: Option<String>,

    /// How often the scheduler polls, e.g. "25ms".
    poll_interval: Option<String>,

    /// The track ids, in display order.
    tracks: Option<Vec<String>>,

    /// The bank ids.
    banks: Option<Vec<String>>,

    /// The bank chain to play. Empty means chain mode is off.
    chain: Option<Vec<String>>,

    /// Presets to load into banks at startup.
    presets: Option<Vec<BankPreset>>,
}

/// A preset to load into a bank.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct BankPreset {
    /// The bank to load into.
    pub bank: String,
    /// The preset name.
    pub preset: String,
}

impl SequencerConfig {
    /// Parse a sequencer config from a YAML file.
    pub fn deserialize(path: &Path) -> Result<SequencerConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SequencerConfig>()?)
    }

    /// Parse a sequencer config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<SequencerConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<SequencerConfig>()?)
    }

    /// Gets the starting tempo.
    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm.unwrap_or(DEFAULT_TEMPO_BPM)
    }

    /// Gets the starting swing.
    pub fn swing_percent(&self) -> f64 {
        self.swing_percent.unwrap_or(0.0)
    }

    /// Gets the number of steps in a bar.
    pub fn steps_per_bar(&self) -> usize {
        self.steps_per_bar.unwrap_or(DEFAULT_STEPS_PER_BAR)
    }

    /// Gets the lookahead window.
    pub fn schedule_ahead(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.schedule_ahead, DEFAULT_SCHEDULE_AHEAD)
    }

    /// Gets the poll interval.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.poll_interval, DEFAULT_POLL_INTERVAL)
    }

    /// Gets the track ids.
    pub fn tracks(&self) -> Vec<String> {
        self.tracks
            .clone()
            .unwrap_or_else(|| DEFAULT_TRACKS.iter().map(|t| t.to_string()).collect())
    }

    /// Gets the bank ids.
    pub fn banks(&self) -> Vec<String> {
        self.banks
            .clone()
            .unwrap_or_else(|| DEFAULT_BANKS.iter().map(|b| b.to_string()).collect())
    }

    /// Gets the bank chain.
    pub fn chain(&self) -> Vec<String> {
        self.chain.clone().unwrap_or_default()
    }

    /// Gets the presets to load at startup.
    pub fn presets(&self) -> Vec<BankPreset> {
        self.presets.clone().unwrap_or_default()
    }

    /// Gets the clock settings. Tempo and swing are clamped into range.
    pub fn clock_settings(&self) -> ClockSettings {
        ClockSettings::new(self.tempo_bpm(), self.swing_percent(), self.steps_per_bar())
    }

    /// Gets the scheduler's lookahead timing.
    pub fn timing(&self) -> Result<LookaheadTiming, ConfigError> {
        Ok(LookaheadTiming {
            poll_interval: self.poll_interval()?,
            schedule_ahead: self.schedule_ahead()?,
        })
    }

    /// Checks everything that can't be expressed in the YAML schema.
    pub fn validate(&self, loader: &dyn PresetLoader) -> Result<(), ConfigError> {
        let steps_per_bar = self.steps_per_bar();
        if steps_per_bar == 0 || steps_per_bar % BEATS_PER_BAR != 0 {
            return Err(ConfigError::Invalid(format!(
                "steps_per_bar must be a positive multiple of {}, got {}",
                BEATS_PER_BAR, steps_per_bar
            )));
        }

        let timing = self.timing()?;
        if timing.schedule_ahead.is_zero() {
            return Err(ConfigError::Invalid("schedule_ahead must be > 0".into()));
        }
        if timing.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be > 0".into()));
        }

        let tracks = self.tracks();
        check_ids("tracks", &tracks)?;
        let banks = self.banks();
        check_ids("banks", &banks)?;

        if let Some(unknown) = self.chain().iter().find(|bank| !banks.contains(bank)) {
            return Err(ConfigError::Invalid(format!(
                "chain refers to unknown bank {}",
                unknown
            )));
        }

        for preset in self.presets() {
            if !banks.contains(&preset.bank) {
                return Err(ConfigError::Invalid(format!(
                    "preset {} refers to unknown bank {}",
                    preset.preset, preset.bank
                )));
            }
            if loader.preset(&preset.preset).is_none() {
                return Err(ConfigError::Invalid(format!("unknown preset {}", preset.preset)));
            }
        }

        Ok(())
    }

    /// Builds the pattern store with the configured presets loaded.
    pub fn build_store(
        &self,
        loader: &dyn PresetLoader,
    ) -> Result<Arc<PatternStore>, ConfigError> {
        self.validate(loader)?;

        let store = PatternStore::new(&self.banks(), &self.tracks(), self.steps_per_bar());
        for preset in self.presets() {
            apply_preset(&store, &preset.bank, loader, &preset.preset)?;
        }
        Ok(Arc::new(store))
    }

    /// Builds a stopped scheduler from this config.
    pub fn build_scheduler(
        &self,
        loader: &dyn PresetLoader,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Scheduler, ConfigError> {
        let store = self.build_store(loader)?;
        let settings = self.clock_settings();
        let scheduler = Scheduler::new(store, settings, self.timing()?, clock)?;

        let chain = self.chain();
        if !chain.is_empty() {
            scheduler.set_chain(&chain)?;
        }

        info!(
            bpm = settings.tempo_bpm(),
            swing = settings.swing_percent(),
            steps_per_bar = settings.steps_per_bar(),
            banks = self.banks().len(),
            tracks = self.tracks().len(),
            "Scheduler configured."
        );
        Ok(scheduler)
    }
}

/// Initializes a scheduler from the given config file, using the built-in presets and the
/// system clock.
pub fn init_scheduler(path: &Path) -> Result<Scheduler, ConfigError> {
    SequencerConfig::deserialize(path)?
        .build_scheduler(&BuiltinPresets, Arc::new(SystemClock::new()))
}

fn parse_duration(value: &Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    value.as_ref().map_or(Ok(default), |duration| {
        Ok(DurationString::from_string(duration.clone())?.into())
    })
}

fn check_ids(kind: &str, ids: &[String]) -> Result<(), ConfigError> {
    if ids.is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", kind)));
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(ConfigError::Invalid(format!(
            "duplicate entry {} in {}",
            duplicate, kind
        )));
    }
    Ok(())
}
