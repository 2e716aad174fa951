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

/// Errors from pattern store, preset and chain operations.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid index: track {track}, step {step}")]
    InvalidIndex { track: String, step: usize },

    #[error("Unknown bank: {0}")]
    UnknownBank(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Malformed pattern payload: {0}")]
    Parse(String),

    #[error("Pattern JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
