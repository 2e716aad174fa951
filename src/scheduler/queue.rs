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
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    time::Duration,
};

use crate::dispatch::SequencerEvent;

use super::cursor::ResumePoint;

/// An armed dispatch waiting for its fire time.
pub(super) struct Pending {
    pub fire_time: Duration,
    seq: u64,
    pub event: SequencerEvent,
    /// Where playback should pick up if this dispatch is cancelled by a pause.
    pub resume: Option<ResumePoint>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_time
            .cmp(&other.fire_time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Every armed dispatch, earliest first. Dispatches with the same fire time come out in the
/// order they were armed.
#[derive(Default)]
pub(super) struct TimerQueue {
    heap: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
}

impl TimerQueue {
    /// Arms a dispatch.
    pub fn arm(&mut self, fire_time: Duration, event: SequencerEvent, resume: Option<ResumePoint>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Pending {
            fire_time,
            seq,
            event,
            resume,
        }));
    }

    /// Removes and returns every dispatch whose fire time has been reached.
    pub fn pop_due(&mut self, now: Duration) -> Vec<Pending> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(pending)| pending.fire_time <= now)
        {
            if let Some(Reverse(pending)) = self.heap.pop() {
                due.push(pending);
            }
        }
        due
    }

    /// Removes and returns the earliest dispatch if its fire time has been reached.
    pub fn pop_next_due(&mut self, now: Duration) -> Option<Pending> {
        if self.next_deadline()? > now {
            return None;
        }
        self.heap.pop().map(|Reverse(pending)| pending)
    }

    /// Puts a popped dispatch back, keeping its place among dispatches with the same fire time.
    pub fn restore(&mut self, pending: Pending) {
        self.heap.push(Reverse(pending));
    }

    /// The fire time of the earliest armed dispatch.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(pending)| pending.fire_time)
    }

    /// Cancels everything, returning the cancelled dispatches earliest first.
    pub fn cancel_all(&mut self) -> Vec<Pending> {
        let mut cancelled: Vec<Pending> = self.heap.drain().map(|Reverse(p)| p).collect();
        cancelled.sort();
        cancelled
    }

    /// The number of armed dispatches.
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
