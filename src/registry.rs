use std::collections::HashMap;

use crate::records::{InputId, TxId};

/// Per-amount count of outputs seen so far in replay order.
///
/// The count for an amount is also the next free global output index for it.
#[derive(Debug, Default, Clone)]
pub struct DenominationRegistry {
    counts: HashMap<u64, u64>,
}

impl DenominationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next free index for `amount` and advances it.
    pub fn allocate(&mut self, amount: u64) -> u64 {
        let next = self.counts.entry(amount).or_insert(0);
        let index = *next;
        *next += 1;
        index
    }

    /// Outputs of `amount` allocated so far; 0 for an unseen amount.
    pub fn current_count(&self, amount: u64) -> u64 {
        self.counts.get(&amount).copied().unwrap_or(0)
    }

    /// Number of distinct amounts observed.
    pub fn denominations(&self) -> usize {
        self.counts.len()
    }

    pub fn total_outputs(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Sequential identity counters for transactions and inputs.
#[derive(Debug, Default, Clone)]
pub struct IdCounters {
    next_tx: u64,
    next_input: u64,
}

impl IdCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_tx(&mut self) -> TxId {
        let id = TxId(self.next_tx);
        self.next_tx += 1;
        id
    }

    pub fn next_input(&mut self) -> InputId {
        let id = InputId(self.next_input);
        self.next_input += 1;
        id
    }

    pub fn transactions(&self) -> u64 {
        self.next_tx
    }

    pub fn inputs(&self) -> u64 {
        self.next_input
    }
}
