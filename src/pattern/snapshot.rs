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
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PatternError;

use super::{Pattern, Step, Track};

/// The serializable form of one or more banks: bank id -> track id -> steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSnapshot {
    banks: BTreeMap<String, BTreeMap<String, Vec<Step>>>,
}

impl PatternSnapshot {
    /// Parses a snapshot from JSON. Any decoding failure is a parse error.
    pub fn from_json(json: &str) -> Result<PatternSnapshot, PatternError> {
        serde_json::from_str(json).map_err(|e| PatternError::Parse(e.to_string()))
    }

    /// Serializes the snapshot to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PatternError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Iterates over the banks in the snapshot.
    pub fn banks(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Vec<Step>>)> {
        self.banks.iter().map(|(id, tracks)| (id.as_str(), tracks))
    }

    /// Returns true if the snapshot has no banks.
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    pub(super) fn insert(&mut self, bank: &str, pattern: &Pattern) {
        self.banks.insert(
            bank.to_string(),
            pattern
                .tracks()
                .iter()
                .map(|track| (track.id().to_string(), track.steps().to_vec()))
                .collect(),
        );
    }

    /// Rebuilds a bank's pattern, checking it against the configured shape.
    pub(super) fn to_pattern(
        &self,
        bank: &str,
        track_ids: &[String],
        steps_per_bar: usize,
    ) -> Result<Pattern, PatternError> {
        let rows = self
            .banks
            .get(bank)
            .ok_or_else(|| PatternError::Parse(format!("bank {} is missing", bank)))?;

        if let Some(unknown) = rows.keys().find(|id| !track_ids.contains(id)) {
            return Err(PatternError::Parse(format!(
                "bank {} has unknown track {}",
                bank, unknown
            )));
        }

        let tracks = track_ids
            .iter()
            .map(|id| {
                let steps = rows.get(id).ok_or_else(|| {
                    PatternError::Parse(format!("bank {} is missing track {}", bank, id))
                })?;
                if steps.len() != steps_per_bar {
                    return Err(PatternError::Parse(format!(
                        "track {} in bank {} has {} steps, expected {}",
                        id,
                        bank,
                        steps.len(),
                        steps_per_bar
                    )));
                }
                if let Some(step) = steps
                    .iter()
                    .position(|s| !(0.0..=1.0).contains(&s.velocity))
                {
                    return Err(PatternError::Parse(format!(
                        "track {} in bank {} has an out of range velocity at step {}",
                        id, bank, step
                    )));
                }
                Ok(Track {
                    id: id.clone(),
                    steps: steps.clone(),
                })
            })
            .collect::<Result<Vec<Track>, PatternError>>()?;

        Ok(Pattern { tracks })
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::PatternError,
        pattern::{PatternStore, Step},
    };

    use super::PatternSnapshot;

    fn new_store() -> PatternStore {
        PatternStore::new(
            &["A".to_string(), "B".to_string()],
            &["kick".to_string(), "bass".to_string()],
            4,
        )
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = new_store();
        store.set_step("A", "kick", 0, Step::on(1.0)).unwrap();
        store
            .set_step("A", "bass", 2, Step::on(0.33).accented().with_note(45))
            .unwrap();
        let original = store.pattern("A").unwrap();

        let json = store.export_bank("A").unwrap().to_json().unwrap();
        store.clear_bank("A").unwrap();

        store
            .import_banks(&PatternSnapshot::from_json(&json).unwrap())
            .unwrap();
        assert_eq!(original, store.pattern("A").unwrap());
    }

    #[test]
    fn test_export_shape() {
        let store = new_store();
        store.set_step("B", "kick", 1, Step::on(0.5)).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&store.export_bank("B").unwrap().to_json().unwrap()).unwrap();

        let kick = &value["B"]["kick"];
        assert_eq!(4, kick.as_array().unwrap().len());
        assert_eq!(true, kick[1]["active"]);
        assert_eq!(0.5, kick[1]["velocity"]);
        assert_eq!(false, kick[1]["accent"]);
        assert!(kick[1]["note"].is_null());
    }

    #[test]
    fn test_import_all_banks() {
        let store = new_store();
        store.set_step("A", "kick", 0, Step::on(1.0)).unwrap();
        store.set_step("B", "bass", 3, Step::on(0.2)).unwrap();
        let snapshot = store.export_all();

        let other = new_store();
        other.import_banks(&snapshot).unwrap();
        assert_eq!(store.pattern("A").unwrap(), other.pattern("A").unwrap());
        assert_eq!(store.pattern("B").unwrap(), other.pattern("B").unwrap());
    }

    #[test]
    fn test_malformed_payloads_leave_banks_untouched() {
        let store = new_store();
        store.set_step("A", "kick", 0, Step::on(1.0)).unwrap();
        let before = store.export_all();

        let payloads = [
            "not json",
            r#"{"A": {"kick": []}}"#,
            r#"{"Z": {}}"#,
            r#"{"A": {"kick": [
                {"active": true, "velocity": 1.0, "accent": false, "note": null},
                {"active": true, "velocity": 1.0, "accent": false, "note": null},
                {"active": true, "velocity": 1.0, "accent": false, "note": null}
            ]}}"#,
        ];
        for payload in payloads {
            let result = PatternSnapshot::from_json(payload).and_then(|s| store.import_banks(&s));
            assert!(matches!(result, Err(PatternError::Parse(_))), "{}", payload);
        }

        // A valid bank B followed by a broken bank A must not half-apply.
        let mut broken = store.export_all();
        broken.banks.get_mut("A").unwrap().remove("bass");
        broken
            .banks
            .get_mut("B")
            .unwrap()
            .get_mut("kick")
            .unwrap()[0] = Step::on(1.0);
        assert!(store.import_banks(&broken).is_err());
        assert_eq!(before, store.export_all());
    }

    #[test]
    fn test_out_of_range_velocity_rejected() {
        let store = new_store();
        let mut snapshot = store.export_bank("A").unwrap();
        snapshot.banks.get_mut("A").unwrap().get_mut("bass").unwrap()[1].velocity = 1.5;
        assert!(matches!(
            store.import_banks(&snapshot),
            Err(PatternError::Parse(_))
        ));
    }
}
