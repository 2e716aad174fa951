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

//! Step data for every track of every bank.
//!
//! Each bank sits behind its own lock. Readers always copy out what they need, so the
//! scheduler never observes a step halfway through an edit.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PatternError;

mod snapshot;

pub use snapshot::PatternSnapshot;

/// The velocity a step gets when nothing else is specified.
pub const DEFAULT_VELOCITY: f32 = 1.0;

/// A single cell of the step grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Whether the step triggers.
    pub active: bool,
    /// Normalized velocity, 0.0 to 1.0.
    pub velocity: f32,
    /// Whether the step is accented.
    pub accent: bool,
    /// Optional MIDI note number for melodic tracks.
    pub note: Option<u8>,
}

impl Step {
    /// Creates an active step with the given velocity.
    pub fn on(velocity: f32) -> Step {
        Step {
            active: true,
            velocity: clamp_velocity(velocity),
            ..Step::default()
        }
    }

    /// Returns the step with its accent flag set.
    pub fn accented(mut self) -> Step {
        self.accent = true;
        self
    }

    /// Returns the step with the given note.
    pub fn with_note(mut self, note: u8) -> Step {
        self.note = Some(note);
        self
    }
}

impl Default for Step {
    fn default() -> Self {
        Step {
            active: false,
            velocity: DEFAULT_VELOCITY,
            accent: false,
            note: None,
        }
    }
}

/// Clamps a velocity into 0.0..=1.0. NaN becomes silence.
pub(crate) fn clamp_velocity(velocity: f32) -> f32 {
    if velocity.is_nan() {
        0.0
    } else {
        velocity.clamp(0.0, 1.0)
    }
}

/// A named, fixed-length row of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: String,
    steps: Vec<Step>,
}

impl Track {
    /// Creates a track with every step inactive.
    pub fn new(id: &str, length: usize) -> Track {
        Track {
            id: id.to_string(),
            steps: vec![Step::default(); length],
        }
    }

    /// Gets the track id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the steps of the track.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// One step row per configured track. Always fully populated.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    tracks: Vec<Track>,
}

impl Pattern {
    /// Creates a pattern where every track has `steps_per_bar` inactive steps.
    pub fn empty(track_ids: &[String], steps_per_bar: usize) -> Pattern {
        Pattern {
            tracks: track_ids
                .iter()
                .map(|id| Track::new(id, steps_per_bar))
                .collect(),
        }
    }

    /// Gets the tracks in configured order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Gets a track by id.
    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    /// Gets a step.
    pub fn step(&self, track: &str, step: usize) -> Result<&Step, PatternError> {
        self.track(track)
            .and_then(|t| t.steps.get(step))
            .ok_or_else(|| invalid_index(track, step))
    }

    /// Gets a mutable step.
    pub fn step_mut(&mut self, track: &str, step: usize) -> Result<&mut Step, PatternError> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == track)
            .and_then(|t| t.steps.get_mut(step))
            .ok_or_else(|| invalid_index(track, step))
    }

    /// Copies out every active step at the given index.
    pub fn active_at(&self, step: usize) -> Vec<(String, Step)> {
        self.tracks
            .iter()
            .filter_map(|track| {
                track
                    .steps
                    .get(step)
                    .filter(|s| s.active)
                    .map(|s| (track.id.clone(), *s))
            })
            .collect()
    }

    /// Resets every step to the inactive default.
    pub fn clear(&mut self) {
        for track in self.tracks.iter_mut() {
            track.steps.fill(Step::default());
        }
    }
}

fn invalid_index(track: &str, step: usize) -> PatternError {
    PatternError::InvalidIndex {
        track: track.to_string(),
        step,
    }
}

/// A bank slot.
struct Bank {
    id: String,
    pattern: RwLock<Pattern>,
}

/// All configured banks. The set of banks and tracks is fixed at construction.
pub struct PatternStore {
    track_ids: Vec<String>,
    steps_per_bar: usize,
    banks: Vec<Bank>,
}

impl PatternStore {
    /// Creates a store with an empty pattern in every bank. Duplicate ids are ignored.
    pub fn new(bank_ids: &[String], track_ids: &[String], steps_per_bar: usize) -> PatternStore {
        let track_ids = dedup(track_ids);
        let banks = dedup(bank_ids)
            .into_iter()
            .map(|id| Bank {
                id,
                pattern: RwLock::new(Pattern::empty(&track_ids, steps_per_bar)),
            })
            .collect();

        PatternStore {
            track_ids,
            steps_per_bar,
            banks,
        }
    }

    /// Gets the bank ids in configured order.
    pub fn bank_ids(&self) -> Vec<String> {
        self.banks.iter().map(|bank| bank.id.clone()).collect()
    }

    /// Gets the track ids in configured order.
    pub fn track_ids(&self) -> &[String] {
        &self.track_ids
    }

    /// Gets the number of steps in every track.
    pub fn steps_per_bar(&self) -> usize {
        self.steps_per_bar
    }

    /// Returns true if the bank exists.
    pub fn has_bank(&self, bank: &str) -> bool {
        self.banks.iter().any(|b| b.id == bank)
    }

    fn bank(&self, bank: &str) -> Result<&Bank, PatternError> {
        self.banks
            .iter()
            .find(|b| b.id == bank)
            .ok_or_else(|| PatternError::UnknownBank(bank.to_string()))
    }

    /// Gets a copy of the pattern in a bank.
    pub fn pattern(&self, bank: &str) -> Result<Pattern, PatternError> {
        Ok(self.bank(bank)?.pattern.read().clone())
    }

    /// Gets a copy of a step.
    pub fn get_step(&self, bank: &str, track: &str, step: usize) -> Result<Step, PatternError> {
        Ok(*self.bank(bank)?.pattern.read().step(track, step)?)
    }

    /// Overwrites a step. The velocity is clamped into 0.0..=1.0.
    pub fn set_step(
        &self,
        bank: &str,
        track: &str,
        step: usize,
        value: Step,
    ) -> Result<(), PatternError> {
        let mut pattern = self.bank(bank)?.pattern.write();
        *pattern.step_mut(track, step)? = Step {
            velocity: clamp_velocity(value.velocity),
            ..value
        };
        Ok(())
    }

    /// Flips a step on or off, leaving its velocity, accent and note alone. Returns the new state.
    pub fn toggle_step(&self, bank: &str, track: &str, step: usize) -> Result<bool, PatternError> {
        let mut pattern = self.bank(bank)?.pattern.write();
        let cell = pattern.step_mut(track, step)?;
        cell.active = !cell.active;
        Ok(cell.active)
    }

    /// Sets a step's velocity. A velocity of zero turns the step off, anything above turns it on.
    pub fn set_velocity(
        &self,
        bank: &str,
        track: &str,
        step: usize,
        velocity: f32,
    ) -> Result<(), PatternError> {
        let mut pattern = self.bank(bank)?.pattern.write();
        let cell = pattern.step_mut(track, step)?;
        let velocity = clamp_velocity(velocity);
        if velocity > 0.0 {
            cell.velocity = velocity;
            cell.active = true;
        } else {
            cell.active = false;
        }
        Ok(())
    }

    /// Copies every step of one bank into another. The two stay independent afterwards.
    pub fn copy_bank(&self, from: &str, to: &str) -> Result<(), PatternError> {
        let source = self.pattern(from)?;
        let destination = self.bank(to)?;
        if from == to {
            return Ok(());
        }

        *destination.pattern.write() = source;
        info!(from, to, "Copied bank.");
        Ok(())
    }

    /// Resets every step of a bank.
    pub fn clear_bank(&self, bank: &str) -> Result<(), PatternError> {
        self.bank(bank)?.pattern.write().clear();
        info!(bank, "Cleared bank.");
        Ok(())
    }

    /// Copies out the active steps of every track at the given step index.
    pub fn active_steps(&self, bank: &str, step: usize) -> Result<Vec<(String, Step)>, PatternError> {
        if step >= self.steps_per_bar {
            return Err(PatternError::InvalidIndex {
                track: "*".to_string(),
                step,
            });
        }

        Ok(self.bank(bank)?.pattern.read().active_at(step))
    }

    /// Applies an edit to a bank's pattern under its write lock.
    pub(crate) fn update<F, R>(&self, bank: &str, edit: F) -> Result<R, PatternError>
    where
        F: FnOnce(&mut Pattern) -> R,
    {
        let mut pattern = self.bank(bank)?.pattern.write();
        Ok(edit(&mut pattern))
    }

    /// Exports one bank.
    pub fn export_bank(&self, bank: &str) -> Result<PatternSnapshot, PatternError> {
        let pattern = self.pattern(bank)?;
        let mut snapshot = PatternSnapshot::default();
        snapshot.insert(bank, &pattern);
        Ok(snapshot)
    }

    /// Exports every bank.
    pub fn export_all(&self) -> PatternSnapshot {
        let mut snapshot = PatternSnapshot::default();
        for bank in self.banks.iter() {
            snapshot.insert(&bank.id, &bank.pattern.read());
        }
        snapshot
    }

    /// Imports every bank present in the snapshot. The whole snapshot is validated first, so
    /// a malformed payload leaves all banks untouched.
    pub fn import_banks(&self, snapshot: &PatternSnapshot) -> Result<(), PatternError> {
        let patterns = snapshot
            .banks()
            .map(|(bank, _)| {
                if !self.has_bank(bank) {
                    return Err(PatternError::Parse(format!("unknown bank {}", bank)));
                }
                Ok((bank, snapshot.to_pattern(bank, &self.track_ids, self.steps_per_bar)?))
            })
            .collect::<Result<Vec<(&str, Pattern)>, PatternError>>()?;

        for (bank, pattern) in patterns {
            *self.bank(bank)?.pattern.write() = pattern;
            debug!(bank, "Imported bank.");
        }
        Ok(())
    }
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !result.contains(id) {
            result.push(id.clone());
        }
    }
    result
}

#[cfg(test)]
mod test {
    use crate::error::PatternError;

    use super::{PatternStore, Step};

    fn names(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn new_store() -> PatternStore {
        PatternStore::new(
            &names(&["A", "B", "C", "D"]),
            &names(&["kick", "snare", "bass"]),
            16,
        )
    }

    #[test]
    fn test_empty_store_fully_populated() {
        let store = new_store();
        assert_eq!(names(&["A", "B", "C", "D"]), store.bank_ids());
        for bank in store.bank_ids() {
            let pattern = store.pattern(&bank).unwrap();
            assert_eq!(3, pattern.tracks().len());
            for track in pattern.tracks() {
                assert_eq!(16, track.steps().len());
                assert!(track.steps().iter().all(|s| *s == Step::default()));
            }
        }
    }

    #[test]
    fn test_invalid_index() {
        let store = new_store();
        assert!(matches!(
            store.get_step("A", "kick", 16),
            Err(PatternError::InvalidIndex { step: 16, .. })
        ));
        assert!(matches!(
            store.set_step("A", "cowbell", 0, Step::on(1.0)),
            Err(PatternError::InvalidIndex { .. })
        ));
        assert!(matches!(
            store.toggle_step("E", "kick", 0),
            Err(PatternError::UnknownBank(_))
        ));
    }

    #[test]
    fn test_toggle_twice_is_noop() {
        let store = new_store();
        store
            .set_step("A", "bass", 3, Step::on(0.4).accented().with_note(36))
            .unwrap();
        let before = store.pattern("A").unwrap();

        assert!(!store.toggle_step("A", "bass", 3).unwrap());
        assert!(store.toggle_step("A", "bass", 3).unwrap());
        assert_eq!(before, store.pattern("A").unwrap());

        assert!(store.toggle_step("A", "kick", 0).unwrap());
        assert!(!store.toggle_step("A", "kick", 0).unwrap());
        assert_eq!(before, store.pattern("A").unwrap());
    }

    #[test]
    fn test_set_step_idempotent_and_clamped() {
        let store = new_store();
        let step = Step::on(0.7).with_note(40);
        store.set_step("B", "bass", 5, step).unwrap();
        let once = store.pattern("B").unwrap();
        store.set_step("B", "bass", 5, step).unwrap();
        assert_eq!(once, store.pattern("B").unwrap());

        let mut loud = Step::on(1.0);
        loud.velocity = 3.0;
        store.set_step("B", "kick", 0, loud).unwrap();
        assert_eq!(1.0, store.get_step("B", "kick", 0).unwrap().velocity);
    }

    #[test]
    fn test_set_velocity() {
        let store = new_store();
        store.set_velocity("A", "snare", 4, 0.5).unwrap();
        let step = store.get_step("A", "snare", 4).unwrap();
        assert!(step.active);
        assert_eq!(0.5, step.velocity);

        store.set_velocity("A", "snare", 4, 0.0).unwrap();
        let step = store.get_step("A", "snare", 4).unwrap();
        assert!(!step.active);
        assert_eq!(0.5, step.velocity);
    }

    #[test]
    fn test_copy_bank_is_independent() {
        let store = new_store();
        store.set_step("A", "kick", 0, Step::on(1.0)).unwrap();
        store.copy_bank("A", "B").unwrap();
        assert_eq!(store.pattern("A").unwrap(), store.pattern("B").unwrap());

        store.toggle_step("B", "kick", 8).unwrap();
        store.toggle_step("A", "snare", 4).unwrap();
        assert!(!store.get_step("A", "kick", 8).unwrap().active);
        assert!(!store.get_step("B", "snare", 4).unwrap().active);

        // Banks not involved in the copy are untouched.
        assert!(store.pattern("C").unwrap().active_at(0).is_empty());

        assert!(matches!(
            store.copy_bank("A", "Z"),
            Err(PatternError::UnknownBank(_))
        ));
        store.copy_bank("A", "A").unwrap();
    }

    #[test]
    fn test_clear_bank() {
        let store = new_store();
        store.set_step("C", "kick", 0, Step::on(0.9).accented()).unwrap();
        store.set_step("D", "kick", 0, Step::on(0.9)).unwrap();
        store.clear_bank("C").unwrap();
        assert_eq!(Step::default(), store.get_step("C", "kick", 0).unwrap());
        assert!(store.get_step("D", "kick", 0).unwrap().active);
    }

    #[test]
    fn test_active_steps() {
        let store = new_store();
        store.set_step("A", "kick", 4, Step::on(1.0)).unwrap();
        store.set_step("A", "bass", 4, Step::on(0.6).with_note(33)).unwrap();
        store.set_step("A", "snare", 5, Step::on(1.0)).unwrap();

        let active = store.active_steps("A", 4).unwrap();
        assert_eq!(2, active.len());
        assert_eq!("kick", active[0].0);
        assert_eq!("bass", active[1].0);
        assert_eq!(Some(33), active[1].1.note);

        assert!(store.active_steps("B", 4).unwrap().is_empty());
        assert!(store.active_steps("A", 16).is_err());
    }

    #[test]
    fn test_duplicate_ids_ignored() {
        let store = PatternStore::new(&names(&["A", "A", "B"]), &names(&["kick", "kick"]), 8);
        assert_eq!(names(&["A", "B"]), store.bank_ids());
        assert_eq!(names(&["kick"]).as_slice(), store.track_ids());
    }
}
