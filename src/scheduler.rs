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

//! The lookahead scheduler.
//!
//! Polling happens on a coarse interval, but step times are computed on an absolute musical
//! time axis. Each poll arms every step that falls inside the lookahead window into a single
//! timer queue, and the worker thread sleeps until the earliest armed dispatch is due. Poll
//! jitter therefore never turns into timing jitter, and cancelling playback is a matter of
//! clearing one queue.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::{
    chain::BankSelector,
    clock::{ClockSettings, TimeSource},
    dispatch::{Dispatcher, Hit, Listener, SequencerEvent, SoundTrigger},
    error::PatternError,
    pattern::PatternStore,
};

use self::{
    cursor::{Cursor, ResumePoint},
    queue::{Pending, TimerQueue},
};

mod cursor;
mod queue;

/// The default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The default lookahead window.
pub const DEFAULT_SCHEDULE_AHEAD: Duration = Duration::from_millis(100);

/// Waits shorter than this are spun out instead of parked on the condvar.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// How often the scheduler polls and how far ahead it arms dispatches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookaheadTiming {
    pub poll_interval: Duration,
    pub schedule_ahead: Duration,
}

impl Default for LookaheadTiming {
    fn default() -> Self {
        LookaheadTiming {
            poll_interval: DEFAULT_POLL_INTERVAL,
            schedule_ahead: DEFAULT_SCHEDULE_AHEAD,
        }
    }
}

/// Whether the transport is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            PlayState::Stopped => "stopped",
            PlayState::Running => "running",
            PlayState::Paused => "paused",
        };
        write!(f, "{}", state)
    }
}

/// A point-in-time view of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportStatus {
    pub state: PlayState,
    pub tempo_bpm: f64,
    pub swing_percent: f64,
    pub steps_per_bar: usize,
    /// The next step to be armed.
    pub step: usize,
    /// The bar the next step belongs to.
    pub bar: u64,
    pub active_bank: String,
    pub chain: Vec<String>,
    pub chain_position: usize,
    /// Dispatches armed but not yet fired.
    pub pending: usize,
}

/// The single-threaded heart of the scheduler: the musical cursor, the bank selector and the
/// timer queue. Time is always passed in, so it can be driven by any clock.
pub struct Transport {
    store: Arc<PatternStore>,
    settings: ClockSettings,
    selector: BankSelector,
    cursor: Cursor,
    queue: TimerQueue,
    /// Beat and bar dispatches whose step already fired when playback was paused.
    carried: Vec<SequencerEvent>,
    state: PlayState,
    schedule_ahead: Duration,
}

impl Transport {
    /// Creates a stopped transport reading from the given store.
    pub fn new(
        store: Arc<PatternStore>,
        settings: ClockSettings,
        schedule_ahead: Duration,
    ) -> Result<Transport, PatternError> {
        let selector = BankSelector::new(&store.bank_ids())?;
        Ok(Transport {
            store,
            settings,
            selector,
            cursor: Cursor::default(),
            queue: TimerQueue::default(),
            carried: Vec::new(),
            state: PlayState::Stopped,
            schedule_ahead,
        })
    }

    /// Gets the play state.
    pub fn state(&self) -> PlayState {
        self.state
    }

    /// Returns true while running.
    pub fn is_running(&self) -> bool {
        self.state == PlayState::Running
    }

    /// Gets the clock settings.
    pub fn settings(&self) -> ClockSettings {
        self.settings
    }

    /// Starts from the first step of the first bar. Returns false if already running.
    pub fn start(&mut self, now: Duration) -> bool {
        if self.is_running() {
            return false;
        }

        self.queue.cancel_all();
        self.carried.clear();
        self.cursor.reset(now);
        self.selector.restart();
        self.state = PlayState::Running;
        true
    }

    /// Cancels every armed dispatch and rewinds to the start. Returns the previous state.
    pub fn stop(&mut self) -> PlayState {
        let previous = self.state;
        self.queue.cancel_all();
        self.carried.clear();
        self.cursor.reset(Duration::ZERO);
        self.state = PlayState::Stopped;
        previous
    }

    /// Cancels every armed dispatch but keeps the position. Steps that were armed and never
    /// fired will be played after resuming, as will the beat and bar dispatches of a step
    /// that fired just before the pause. Returns false if not running.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }

        for pending in self.queue.cancel_all() {
            match pending.resume {
                Some(resume) => {
                    self.cursor.step = resume.step;
                    self.cursor.bar = resume.bar;
                    self.selector.restore(resume.chain_position, &resume.bank);
                    break;
                }
                None => self.carried.push(pending.event),
            }
        }

        self.state = PlayState::Paused;
        true
    }

    /// Continues from the paused position, with the next step due now. Time spent paused is
    /// not replayed. Returns false if not paused.
    pub fn resume(&mut self, now: Duration) -> bool {
        if self.state != PlayState::Paused {
            return false;
        }

        for mut event in self.carried.drain(..) {
            retime(&mut event, now);
            self.queue.arm(now, event, None);
        }
        self.cursor.next_step_time = now;
        self.state = PlayState::Running;
        true
    }

    /// Sets the tempo for steps armed from now on. Returns the clamped tempo.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.settings.set_tempo(bpm)
    }

    /// Sets the swing for steps armed from now on. Returns the clamped swing.
    pub fn set_swing(&mut self, percent: f64) -> f64 {
        self.settings.set_swing(percent)
    }

    /// Switches the bank read for the next armed step.
    pub fn switch_bank(&mut self, bank: &str) -> Result<(), PatternError> {
        self.selector.switch_bank(bank)
    }

    /// Configures the bank chain.
    pub fn set_chain(&mut self, chain: &[String]) -> Result<(), PatternError> {
        self.selector.set_chain(chain)
    }

    /// Turns chain mode off.
    pub fn clear_chain(&mut self) {
        self.selector.clear_chain();
    }

    /// Gets the bank the next armed step reads from.
    pub fn active_bank(&self) -> &str {
        self.selector.active()
    }

    /// Arms every step whose time falls inside the lookahead window. Steps that are already
    /// more than a full window late are skipped. Returns the number of steps armed.
    pub fn schedule(&mut self, now: Duration) -> usize {
        if !self.is_running() {
            return 0;
        }

        let horizon = now + self.schedule_ahead;
        let mut armed = 0;
        while self.cursor.next_step_time < horizon {
            let step = self.cursor.step;
            let bar = self.cursor.bar;
            let fire_time = self.cursor.next_step_time + self.settings.swing_delay(step);

            if fire_time + self.schedule_ahead < now {
                debug!(step, bar, late = ?(now - fire_time), "Skipping missed step.");
            } else {
                self.arm_step(step, bar, fire_time);
                armed += 1;
            }

            if self
                .cursor
                .advance(self.settings.step_duration(), self.settings.steps_per_bar())
            {
                self.selector.advance_bar();
            }
        }
        armed
    }

    fn arm_step(&mut self, step: usize, bar: u64, fire_time: Duration) {
        let bank = self.selector.active().to_string();
        let hits = match self.store.active_steps(&bank, step) {
            Ok(active) => active
                .into_iter()
                .map(|(track, s)| Hit {
                    track,
                    velocity: s.velocity,
                    accent: s.accent,
                    note: s.note,
                })
                .collect(),
            Err(e) => {
                warn!(
                    err = e.to_string(),
                    step,
                    bank = bank.as_str(),
                    "Unable to read step."
                );
                Vec::new()
            }
        };

        let resume = ResumePoint {
            step,
            bar,
            chain_position: self.selector.position(),
            bank: bank.clone(),
        };
        self.queue.arm(
            fire_time,
            SequencerEvent::Step {
                step,
                bar,
                bank: bank.clone(),
                fire_time,
                hits,
            },
            Some(resume),
        );

        let steps_per_beat = self.settings.steps_per_beat();
        if step % steps_per_beat == 0 {
            self.queue.arm(
                fire_time,
                SequencerEvent::Beat {
                    beat: step / steps_per_beat,
                    bar,
                    fire_time,
                },
                None,
            );
        }
        if step == 0 {
            self.queue
                .arm(fire_time, SequencerEvent::Bar { bar, bank, fire_time }, None);
        }
    }

    /// Removes and returns every dispatch that is due, earliest first.
    pub fn take_due(&mut self, now: Duration) -> Vec<SequencerEvent> {
        self.queue
            .pop_due(now)
            .into_iter()
            .map(|pending| pending.event)
            .collect()
    }

    fn pop_next_due(&mut self, now: Duration) -> Option<Pending> {
        self.queue.pop_next_due(now)
    }

    /// Returns a dispatch that was popped but never delivered.
    fn restore(&mut self, pending: Pending) {
        self.queue.restore(pending);
    }

    /// The fire time of the earliest armed dispatch.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline()
    }

    /// Clears every step of the bank currently being read.
    pub fn clear_active_bank(&self) -> Result<(), PatternError> {
        self.store.clear_bank(self.selector.active())
    }

    /// Gets a status snapshot.
    pub fn status(&self) -> TransportStatus {
        TransportStatus {
            state: self.state,
            tempo_bpm: self.settings.tempo_bpm(),
            swing_percent: self.settings.swing_percent(),
            steps_per_bar: self.settings.steps_per_bar(),
            step: self.cursor.step,
            bar: self.cursor.bar,
            active_bank: self.selector.active().to_string(),
            chain: self.selector.chain().to_vec(),
            chain_position: self.selector.position(),
            pending: self.queue.len(),
        }
    }
}

fn retime(event: &mut SequencerEvent, at: Duration) {
    match event {
        SequencerEvent::Step { fire_time, .. }
        | SequencerEvent::Beat { fire_time, .. }
        | SequencerEvent::Bar { fire_time, .. } => *fire_time = at,
        SequencerEvent::Stopped => {}
    }
}

/// State shared between the scheduler handle and its worker thread.
struct Shared {
    transport: Mutex<Transport>,
    wake: Condvar,
    /// Bumped on every stop/pause. A worker exits as soon as it no longer matches.
    generation: AtomicU64,
    clock: Arc<dyn TimeSource>,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
}

/// A running step sequencer. Each scheduler is independent and owns one worker thread while
/// playing.
pub struct Scheduler {
    shared: Arc<Shared>,
    store: Arc<PatternStore>,
    worker: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl Scheduler {
    /// Creates a stopped scheduler.
    pub fn new(
        store: Arc<PatternStore>,
        settings: ClockSettings,
        timing: LookaheadTiming,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Scheduler, PatternError> {
        let transport = Transport::new(store.clone(), settings, timing.schedule_ahead)?;
        Ok(Scheduler {
            shared: Arc::new(Shared {
                transport: Mutex::new(transport),
                wake: Condvar::new(),
                generation: AtomicU64::new(0),
                clock,
                dispatcher: Arc::new(Dispatcher::new()),
                poll_interval: timing.poll_interval,
            }),
            store,
            worker: Mutex::new(None),
            span: span!(Level::INFO, "scheduler"),
        })
    }

    /// Gets the pattern store the scheduler reads from.
    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// Gets the dispatcher that delivers fired events.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.shared.dispatcher
    }

    /// Sets the sound trigger.
    pub fn set_sound_trigger(&self, trigger: Option<Arc<dyn SoundTrigger>>) {
        self.shared.dispatcher.set_sound_trigger(trigger);
    }

    /// Adds an event listener.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.shared.dispatcher.add_listener(listener);
    }

    /// Opens an event stream.
    pub fn subscribe(&self) -> Receiver<SequencerEvent> {
        self.shared.dispatcher.subscribe()
    }

    /// Starts playback from the beginning.
    pub fn start(&self) {
        let _enter = self.span.enter();

        let started = self.shared.transport.lock().start(self.shared.clock.now());
        if !started {
            info!("Scheduler is already running.");
            return;
        }

        self.spawn_worker();
        let status = self.status();
        info!(
            bpm = status.tempo_bpm,
            swing = status.swing_percent,
            bank = status.active_bank.as_str(),
            "Scheduler started."
        );
    }

    /// Stops playback and rewinds. Once this returns, no armed dispatch will fire.
    pub fn stop(&self) {
        let _enter = self.span.enter();

        let previous = self.halt(|transport| transport.stop());
        if previous == PlayState::Stopped {
            return;
        }

        self.shared.dispatcher.deliver(&SequencerEvent::Stopped);
        info!("Scheduler stopped.");
    }

    /// Pauses playback, keeping the position. Once this returns, no armed dispatch will fire.
    pub fn pause(&self) {
        let _enter = self.span.enter();

        if self.halt(|transport| transport.pause()) {
            let status = self.status();
            info!(step = status.step, bar = status.bar, "Scheduler paused.");
        }
    }

    /// Resumes from a pause.
    pub fn resume(&self) {
        let _enter = self.span.enter();

        let resumed = self.shared.transport.lock().resume(self.shared.clock.now());
        if !resumed {
            info!("Scheduler is not paused.");
            return;
        }

        self.spawn_worker();
        info!("Scheduler resumed.");
    }

    /// Sets the tempo. Dispatches that are already armed keep their times.
    pub fn set_tempo(&self, bpm: f64) -> f64 {
        let bpm = self.shared.transport.lock().set_tempo(bpm);
        info!(bpm, "Tempo changed.");
        bpm
    }

    /// Sets the swing amount. Dispatches that are already armed keep their times.
    pub fn set_swing(&self, percent: f64) -> f64 {
        let swing = self.shared.transport.lock().set_swing(percent);
        info!(swing, "Swing changed.");
        swing
    }

    /// Switches the bank read for upcoming steps.
    pub fn switch_bank(&self, bank: &str) -> Result<(), PatternError> {
        self.shared.transport.lock().switch_bank(bank)
    }

    /// Configures the bank chain. An empty chain turns chain mode off.
    pub fn set_chain(&self, chain: &[String]) -> Result<(), PatternError> {
        self.shared.transport.lock().set_chain(chain)
    }

    /// Turns chain mode off.
    pub fn clear_chain(&self) {
        self.shared.transport.lock().clear_chain();
    }

    /// Clears every step of the bank currently being read.
    pub fn clear_active_bank(&self) -> Result<(), PatternError> {
        self.shared.transport.lock().clear_active_bank()
    }

    /// Gets a status snapshot.
    pub fn status(&self) -> TransportStatus {
        self.shared.transport.lock().status()
    }

    fn spawn_worker(&self) {
        let generation = self.shared.generation.load(Ordering::Acquire);
        let shared = self.shared.clone();
        let handle = thread::spawn(move || Scheduler::run(shared, generation));

        let previous = self.worker.lock().replace(handle);
        if let Some(previous) = previous {
            // Only reachable when a stop came from the worker itself, which has finished by now
            // or is about to.
            Scheduler::join(previous);
        }
    }

    /// Retires the worker, waits for it to exit and then applies a stop or pause to the
    /// transport. The worker hands back anything it popped but never delivered before exiting,
    /// so the transport sees every undelivered dispatch.
    fn halt<F, R>(&self, apply: F) -> R
    where
        F: FnOnce(&mut Transport) -> R,
    {
        {
            let _transport = self.shared.transport.lock();
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.shared.wake.notify_all();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            Scheduler::join(worker);
        }

        let mut transport = self.shared.transport.lock();
        apply(&mut *transport)
    }

    fn join(worker: JoinHandle<()>) {
        // A listener may stop or pause the scheduler from inside a dispatch. Delivery checks
        // the generation before every recipient, so nothing else goes out.
        if worker.thread().id() == thread::current().id() {
            return;
        }

        if worker.join().is_err() {
            error!("Scheduler worker panicked.");
        }
    }

    /// The worker loop: poll, arm, sleep until the next deadline, deliver. Dispatches are
    /// popped one at a time so that whatever hasn't been delivered yet stays in the queue.
    fn run(shared: Arc<Shared>, generation: u64) {
        let span = span!(Level::DEBUG, "scheduler worker");
        let _enter = span.enter();

        let live = || shared.generation.load(Ordering::Acquire) == generation;
        let mut next_poll = Duration::ZERO;
        loop {
            let pending = {
                let mut transport = shared.transport.lock();
                loop {
                    if !live() || !transport.is_running() {
                        return;
                    }

                    let now = shared.clock.now();
                    if now >= next_poll {
                        transport.schedule(now);
                        next_poll = now + shared.poll_interval;
                    }

                    if let Some(pending) = transport.pop_next_due(now) {
                        break pending;
                    }

                    let deadline = transport
                        .next_deadline()
                        .map_or(next_poll, |deadline| deadline.min(next_poll));
                    let wait = deadline.saturating_sub(now);
                    if wait <= SPIN_THRESHOLD {
                        MutexGuard::unlocked(&mut transport, || spin_sleep::sleep(wait));
                    } else {
                        shared.wake.wait_for(&mut transport, wait - SPIN_THRESHOLD);
                    }
                }
            };

            if !shared.dispatcher.deliver_while(&pending.event, &live) {
                shared.transport.lock().restore(pending);
                return;
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.halt(|transport| transport.stop());
    }
}
