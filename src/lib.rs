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

//! A lookahead step sequencer.
//!
//! A [`Scheduler`] plays the patterns held in a [`PatternStore`] by arming step, beat and
//! bar dispatches slightly ahead of time on an absolute clock, then delivering them through a
//! [`Dispatcher`] to a [`SoundTrigger`], listeners and event subscribers.

pub mod chain;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pattern;
pub mod presets;
pub mod scheduler;
#[cfg(test)]
mod testutil;

pub use chain::BankSelector;
pub use clock::{ClockSettings, ManualClock, SystemClock, TimeSource};
pub use config::{init_scheduler, ConfigError, SequencerConfig};
pub use dispatch::{
    Dispatcher, Hit, Listener, LoggingTrigger, SequencerEvent, SoundTrigger, TriggerError,
};
pub use error::PatternError;
pub use pattern::{Pattern, PatternSnapshot, PatternStore, Step, Track};
pub use presets::{apply_preset, BuiltinPresets, PresetLoader};
pub use scheduler::{LookaheadTiming, PlayState, Scheduler, Transport, TransportStatus};
