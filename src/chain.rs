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
use std::fmt;

use tracing::{debug, info};

use crate::error::PatternError;

/// Decides which bank the scheduler reads from.
///
/// With an empty chain the active bank only changes through [BankSelector::switch_bank].
/// With a chain configured, the active bank follows the chain, moving one entry per bar.
#[derive(Debug, Clone)]
pub struct BankSelector {
    banks: Vec<String>,
    active: String,
    chain: Vec<String>,
    position: usize,
}

impl BankSelector {
    /// Creates a selector over the given banks. The first bank starts out active.
    pub fn new(banks: &[String]) -> Result<BankSelector, PatternError> {
        let active = banks
            .first()
            .cloned()
            .ok_or_else(|| PatternError::UnknownBank("<none configured>".to_string()))?;

        Ok(BankSelector {
            banks: banks.to_vec(),
            active,
            chain: Vec::new(),
            position: 0,
        })
    }

    /// Gets the active bank.
    pub fn active(&self) -> &str {
        &self.active
    }

    /// Gets the configured chain.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Gets the current position within the chain.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns true when a chain is driving bank changes.
    pub fn is_chaining(&self) -> bool {
        !self.chain.is_empty()
    }

    /// Switches the active bank immediately.
    pub fn switch_bank(&mut self, bank: &str) -> Result<(), PatternError> {
        if !self.banks.iter().any(|b| b == bank) {
            return Err(PatternError::UnknownBank(bank.to_string()));
        }

        self.active = bank.to_string();
        info!(bank, "Switched bank.");
        Ok(())
    }

    /// Configures the chain. Every entry must name a known bank or the whole chain is rejected
    /// and the previous one stays. A non-empty chain starts over at its first entry.
    pub fn set_chain(&mut self, chain: &[String]) -> Result<(), PatternError> {
        if let Some(unknown) = chain.iter().find(|id| !self.banks.contains(id)) {
            return Err(PatternError::UnknownBank(unknown.clone()));
        }

        self.chain = chain.to_vec();
        self.restart();
        info!(chain = %ChainDisplay(&self.chain), "Chain configured.");
        Ok(())
    }

    /// Disables chain mode. The active bank stays where it is.
    pub fn clear_chain(&mut self) {
        self.chain.clear();
        self.position = 0;
    }

    /// Rewinds the chain to its first entry.
    pub fn restart(&mut self) {
        self.position = 0;
        if let Some(first) = self.chain.first() {
            self.active = first.clone();
        }
    }

    /// Called once per bar boundary. Moves to the next chain entry, wrapping around, and
    /// returns the bank to read from for the new bar.
    pub fn advance_bar(&mut self) -> &str {
        if !self.chain.is_empty() {
            self.position = (self.position + 1) % self.chain.len();
            self.active = self.chain[self.position].clone();
            debug!(
                position = self.position,
                bank = self.active.as_str(),
                "Chain advanced."
            );
        }
        &self.active
    }

    /// Puts the selector back to an earlier position.
    pub(crate) fn restore(&mut self, position: usize, active: &str) {
        self.position = if self.chain.is_empty() {
            0
        } else {
            position % self.chain.len()
        };
        self.active = active.to_string();
    }
}

struct ChainDisplay<'a>(&'a [String]);

impl fmt::Display for ChainDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" -> "))
    }
}
