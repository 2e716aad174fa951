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
use std::time::Duration;

/// The musical time position of the scheduler. `next_step_time` only ever moves by whole
/// step durations, never by how late a poll happened to run.
#[derive(Debug, Clone, Default)]
pub(super) struct Cursor {
    /// Absolute time of the next step that hasn't been armed yet.
    pub next_step_time: Duration,
    /// Index of that step within its bar.
    pub step: usize,
    /// The bar that step belongs to.
    pub bar: u64,
}

impl Cursor {
    /// Moves back to the first step of the first bar, starting at the given time.
    pub fn reset(&mut self, at: Duration) {
        self.next_step_time = at;
        self.step = 0;
        self.bar = 0;
    }

    /// Moves to the next step. Returns true when a new bar begins.
    pub fn advance(&mut self, step_duration: Duration, steps_per_bar: usize) -> bool {
        self.next_step_time += step_duration;
        self.step = (self.step + 1) % steps_per_bar;
        if self.step == 0 {
            self.bar += 1;
            return true;
        }
        false
    }
}

/// The cursor and chain position as they were when a step was armed.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ResumePoint {
    pub step: usize,
    pub bar: u64,
    pub chain_position: usize,
    pub bank: String,
}
