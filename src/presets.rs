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

use tracing::{debug, info};

use crate::{
    error::PatternError,
    pattern::{PatternStore, DEFAULT_VELOCITY},
};

/// A preset pattern: track id -> 0/1 per step.
pub type PresetPattern = BTreeMap<String, Vec<u8>>;

/// Supplies named patterns that can be loaded into a bank.
pub trait PresetLoader: Send + Sync {
    /// Lists the available preset names.
    fn preset_names(&self) -> Vec<String>;

    /// Gets a preset by name.
    fn preset(&self, name: &str) -> Option<PresetPattern>;
}

const BUILTIN: &[(&str, &[(&str, [u8; 16])])] = &[
    (
        "four-on-floor",
        &[
            ("kick", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
            ("clap", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
        ],
    ),
    (
        "detroit",
        &[
            ("kick", [1, 0, 0, 0, 1, 0, 1, 0, 1, 0, 0, 0, 1, 0, 1, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 1]),
            ("hihat", [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]),
            ("clap", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
        ],
    ),
    (
        "acid",
        &[
            ("kick", [1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 1, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
            ("clap", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
        ],
    ),
    (
        "industrial",
        &[
            ("kick", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 1, 0, 1, 0]),
            ("hihat", [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0]),
            ("clap", [0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 1]),
        ],
    ),
    (
        "minimal",
        &[
            ("kick", [1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0]),
            ("clap", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        ],
    ),
    (
        "berlin",
        &[
            ("kick", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1, 1, 0, 1]),
            ("clap", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        ],
    ),
];

/// The drum presets that ship with the sequencer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPresets;

impl PresetLoader for BuiltinPresets {
    fn preset_names(&self) -> Vec<String> {
        BUILTIN.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn preset(&self, name: &str) -> Option<PresetPattern> {
        BUILTIN
            .iter()
            .find(|(preset, _)| *preset == name)
            .map(|(_, rows)| {
                rows.iter()
                    .map(|(track, row)| (track.to_string(), row.to_vec()))
                    .collect()
            })
    }
}

/// Loads a preset into a bank. Tracks named by the preset have their steps switched on or
/// off with the default velocity; other tracks are left as they were. Preset tracks that the
/// store doesn't know about are skipped.
pub fn apply_preset(
    store: &PatternStore,
    bank: &str,
    loader: &dyn PresetLoader,
    name: &str,
) -> Result<(), PatternError> {
    let preset = loader
        .preset(name)
        .ok_or_else(|| PatternError::UnknownPreset(name.to_string()))?;

    store.update(bank, |pattern| {
        for (track, row) in preset.iter() {
            if pattern.track(track).is_none() {
                debug!(
                    preset = name,
                    track = track.as_str(),
                    "Skipping unconfigured preset track."
                );
                continue;
            }

            for (index, value) in row.iter().enumerate() {
                if let Ok(step) = pattern.step_mut(track, index) {
                    step.active = *value != 0;
                    step.velocity = DEFAULT_VELOCITY;
                }
            }
        }
    })?;

    info!(preset = name, bank, "Loaded preset.");
    Ok(())
}
