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
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::dispatch::{Hit, Listener, SequencerEvent, SoundTrigger, TriggerError};

mod polling;

pub use polling::eventually;

/// A sound trigger that remembers every hit it played.
pub struct RecordingTrigger {
    available: AtomicBool,
    triggered: Mutex<Vec<Hit>>,
}

impl RecordingTrigger {
    pub fn new() -> RecordingTrigger {
        RecordingTrigger {
            available: AtomicBool::new(true),
            triggered: Mutex::new(Vec::new()),
        }
    }

    /// Makes the trigger refuse (or accept) hits.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Gets every hit played so far.
    pub fn triggered(&self) -> Vec<Hit> {
        self.triggered.lock().clone()
    }
}

impl SoundTrigger for RecordingTrigger {
    fn trigger_track(
        &self,
        track: &str,
        velocity: f32,
        accent: bool,
        note: Option<u8>,
    ) -> Result<(), TriggerError> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(TriggerError::Unavailable("recording trigger offline".into()));
        }

        self.triggered.lock().push(Hit {
            track: track.to_string(),
            velocity,
            accent,
            note,
        });
        Ok(())
    }
}

/// A listener that remembers every event.
pub struct RecordingListener {
    events: Mutex<Vec<SequencerEvent>>,
}

impl RecordingListener {
    pub fn new() -> RecordingListener {
        RecordingListener {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Gets every event received so far.
    pub fn events(&self) -> Vec<SequencerEvent> {
        self.events.lock().clone()
    }

    /// Gets only the step events.
    pub fn steps(&self) -> Vec<SequencerEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, SequencerEvent::Step { .. }))
            .collect()
    }
}

impl Listener for RecordingListener {
    fn on_event(&self, event: &SequencerEvent) {
        self.events.lock().push(event.clone());
    }
}
