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

//! Delivery of fired events to the sound trigger, listeners and event subscribers.

use std::{sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// One track sounding on a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// The track to trigger.
    pub track: String,
    /// Normalized velocity, 0.0 to 1.0.
    pub velocity: f32,
    /// Whether the step is accented.
    pub accent: bool,
    /// The note for melodic tracks.
    pub note: Option<u8>,
}

/// An event emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// A step fired. `hits` holds only the tracks that were active.
    Step {
        step: usize,
        bar: u64,
        bank: String,
        fire_time: Duration,
        hits: Vec<Hit>,
    },
    /// A beat started.
    Beat {
        beat: usize,
        bar: u64,
        fire_time: Duration,
    },
    /// A bar started.
    Bar {
        bar: u64,
        bank: String,
        fire_time: Duration,
    },
    /// The scheduler was stopped.
    Stopped,
}

impl SequencerEvent {
    /// The time the event was scheduled for, if it is a timed event.
    pub fn fire_time(&self) -> Option<Duration> {
        match self {
            SequencerEvent::Step { fire_time, .. }
            | SequencerEvent::Beat { fire_time, .. }
            | SequencerEvent::Bar { fire_time, .. } => Some(*fire_time),
            SequencerEvent::Stopped => None,
        }
    }
}

/// Errors a sound trigger can report.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Sound trigger unavailable: {0}")]
    Unavailable(String),
}

/// Plays a sound for a track.
pub trait SoundTrigger: Send + Sync {
    /// Triggers the given track.
    fn trigger_track(
        &self,
        track: &str,
        velocity: f32,
        accent: bool,
        note: Option<u8>,
    ) -> Result<(), TriggerError>;
}

/// Receives every event the scheduler fires, e.g. to draw a playhead.
pub trait Listener: Send + Sync {
    /// Called for each event.
    fn on_event(&self, event: &SequencerEvent);
}

/// A sound trigger that only logs.
#[derive(Debug, Default)]
pub struct LoggingTrigger;

impl SoundTrigger for LoggingTrigger {
    fn trigger_track(
        &self,
        track: &str,
        velocity: f32,
        accent: bool,
        note: Option<u8>,
    ) -> Result<(), TriggerError> {
        info!(track, velocity, accent, note = ?note, "Trigger.");
        Ok(())
    }
}

/// Fans fired events out to the configured collaborators.
#[derive(Default)]
pub struct Dispatcher {
    trigger: RwLock<Option<Arc<dyn SoundTrigger>>>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    subscribers: Mutex<Vec<Sender<SequencerEvent>>>,
}

impl Dispatcher {
    /// Creates a dispatcher with nothing attached.
    pub fn new() -> Dispatcher {
        Dispatcher::default()
    }

    /// Sets or removes the sound trigger.
    pub fn set_sound_trigger(&self, trigger: Option<Arc<dyn SoundTrigger>>) {
        *self.trigger.write() = trigger;
    }

    /// Adds a listener. Listeners are never replaced, only added.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }

    /// Opens a new event stream. The stream is dropped from the dispatcher once the receiver
    /// goes away.
    pub fn subscribe(&self) -> Receiver<SequencerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers an event. Step hits go to the sound trigger first, then the event goes to
    /// every listener and subscriber.
    pub fn deliver(&self, event: &SequencerEvent) {
        self.deliver_while(event, &|| true);
    }

    /// Delivers an event like [`Dispatcher::deliver`], checking `live` before each hit, each
    /// listener and the subscribers. Delivery ends as soon as `live` returns false. Returns
    /// false if the event was withheld before reaching anyone.
    pub fn deliver_while(&self, event: &SequencerEvent, live: &dyn Fn() -> bool) -> bool {
        if !live() {
            return false;
        }

        if let SequencerEvent::Step { hits, .. } = event {
            if !self.trigger_hits(hits, live) {
                return true;
            }
        }

        let listeners = self.listeners.read().clone();
        for listener in listeners.iter() {
            if !live() {
                return true;
            }
            listener.on_event(event);
        }

        if !live() {
            return true;
        }
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        true
    }

    /// Returns false if `live` cut the hits short.
    fn trigger_hits(&self, hits: &[Hit], live: &dyn Fn() -> bool) -> bool {
        if hits.is_empty() {
            return true;
        }

        let trigger = self.trigger.read().clone();
        let Some(trigger) = trigger else {
            debug!(hits = hits.len(), "No sound trigger attached, dropping hits.");
            return true;
        };

        for hit in hits {
            if !live() {
                return false;
            }
            if let Err(e) = trigger.trigger_track(&hit.track, hit.velocity, hit.accent, hit.note)
            {
                warn!(
                    err = e.to_string(),
                    track = hit.track.as_str(),
                    "Dropped trigger."
                );
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use crate::testutil::{RecordingListener, RecordingTrigger};

    use super::{Dispatcher, Hit, Listener, SequencerEvent};

    fn step_event(hits: Vec<Hit>) -> SequencerEvent {
        SequencerEvent::Step {
            step: 0,
            bar: 0,
            bank: "A".to_string(),
            fire_time: Duration::from_millis(10),
            hits,
        }
    }

    fn hit(track: &str) -> Hit {
        Hit {
            track: track.to_string(),
            velocity: 0.8,
            accent: true,
            note: Some(60),
        }
    }

    #[test]
    fn test_delivers_hits_to_trigger() {
        let dispatcher = Dispatcher::new();
        let trigger = Arc::new(RecordingTrigger::new());
        dispatcher.set_sound_trigger(Some(trigger.clone()));

        dispatcher.deliver(&step_event(vec![hit("kick"), hit("bass")]));
        dispatcher.deliver(&step_event(vec![]));
        dispatcher.deliver(&SequencerEvent::Beat {
            beat: 0,
            bar: 0,
            fire_time: Duration::ZERO,
        });

        let triggered = trigger.triggered();
        assert_eq!(2, triggered.len());
        assert_eq!(hit("kick"), triggered[0]);
        assert_eq!(hit("bass"), triggered[1]);
    }

    #[test]
    fn test_unavailable_trigger_is_not_fatal() {
        let dispatcher = Dispatcher::new();
        let trigger = Arc::new(RecordingTrigger::new());
        trigger.set_available(false);
        dispatcher.set_sound_trigger(Some(trigger.clone()));
        let listener = Arc::new(RecordingListener::new());
        dispatcher.add_listener(listener.clone());

        dispatcher.deliver(&step_event(vec![hit("kick")]));

        assert!(trigger.triggered().is_empty());
        assert_eq!(1, listener.events().len());

        trigger.set_available(true);
        dispatcher.deliver(&step_event(vec![hit("kick")]));
        assert_eq!(1, trigger.triggered().len());
    }

    #[test]
    fn test_no_trigger_attached() {
        let dispatcher = Dispatcher::new();
        let listener = Arc::new(RecordingListener::new());
        dispatcher.add_listener(listener.clone());
        dispatcher.deliver(&step_event(vec![hit("kick")]));
        assert_eq!(1, listener.events().len());
    }

    #[test]
    fn test_listeners_accumulate() {
        let dispatcher = Dispatcher::new();
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        dispatcher.add_listener(first.clone());
        dispatcher.add_listener(second.clone());

        dispatcher.deliver(&SequencerEvent::Stopped);
        assert_eq!(vec![SequencerEvent::Stopped], first.events());
        assert_eq!(vec![SequencerEvent::Stopped], second.events());
    }

    #[test]
    fn test_subscribers() {
        let dispatcher = Dispatcher::new();
        let rx = dispatcher.subscribe();
        let dropped = dispatcher.subscribe();
        drop(dropped);

        dispatcher.deliver(&step_event(vec![hit("snare")]));
        assert_eq!(step_event(vec![hit("snare")]), rx.try_recv().unwrap());
        assert_eq!(1, dispatcher.subscribers.lock().len());
    }

    /// Flips a flag when it sees an event, standing in for a listener that stops playback.
    struct Halting {
        live: Arc<AtomicBool>,
    }

    impl Listener for Halting {
        fn on_event(&self, _event: &SequencerEvent) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deliver_while_stops_mid_fan_out() {
        let dispatcher = Dispatcher::new();
        let live = Arc::new(AtomicBool::new(true));
        let before = Arc::new(RecordingListener::new());
        let after = Arc::new(RecordingListener::new());
        dispatcher.add_listener(before.clone());
        dispatcher.add_listener(Arc::new(Halting { live: live.clone() }));
        dispatcher.add_listener(after.clone());
        let rx = dispatcher.subscribe();

        let check = live.clone();
        let delivered =
            dispatcher.deliver_while(&step_event(vec![]), &move || check.load(Ordering::SeqCst));
        assert!(delivered);

        assert_eq!(1, before.events().len());
        assert!(after.events().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deliver_while_withheld() {
        let dispatcher = Dispatcher::new();
        let trigger = Arc::new(RecordingTrigger::new());
        dispatcher.set_sound_trigger(Some(trigger.clone()));
        let listener = Arc::new(RecordingListener::new());
        dispatcher.add_listener(listener.clone());

        assert!(!dispatcher.deliver_while(&step_event(vec![hit("kick")]), &|| false));
        assert!(trigger.triggered().is_empty());
        assert!(listener.events().is_empty());
    }
}
