// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Vector clocks.
//!
//! One logical counter per participating process. A clock is owned by exactly
//! one process; peers only ever see copies carried inside envelopes.
//!
//! # Invariants
//! - `tick` strictly increases the ticking process's own entry
//! - `merge` and `advance_to` never decrease any entry
//! - An absent entry means "never observed", distinct from a zero count

use alloc::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ProcessId;

/// Returned by [`VectorClock::find_tick`] for a process the clock has never observed.
pub const NEVER_OBSERVED: i64 = -1;

/// Partial order between two clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    /// Every entry `<=` the other's, at least one strictly.
    Before,
    /// Every entry `>=` the other's, at least one strictly.
    After,
    Concurrent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<ProcessId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp one local event of `pid`.
    pub fn tick(&mut self, pid: ProcessId) -> u64 {
        let entry = self.entries.entry(pid).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Overwrite an entry. Only used to install a freshly computed cut value.
    pub fn set(&mut self, pid: ProcessId, ticks: u64) {
        self.entries.insert(pid, ticks);
    }

    /// Raise an entry to `ticks` if it is currently lower.
    pub fn advance_to(&mut self, pid: ProcessId, ticks: u64) {
        let entry = self.entries.entry(pid).or_insert(0);
        if *entry < ticks {
            *entry = ticks;
        }
    }

    pub fn get(&self, pid: &ProcessId) -> Option<u64> {
        self.entries.get(pid).copied()
    }

    /// Entry for `pid`, or [`NEVER_OBSERVED`].
    pub fn find_tick(&self, pid: &ProcessId) -> i64 {
        match self.entries.get(pid) {
            Some(ticks) => *ticks as i64,
            None => NEVER_OBSERVED,
        }
    }

    /// Pointwise maximum with `other`, adding entries this clock lacks.
    pub fn merge(&mut self, other: &VectorClock) {
        for (pid, &ticks) in &other.entries {
            let entry = self.entries.entry(*pid).or_insert(ticks);
            if *entry < ticks {
                *entry = ticks;
            }
        }
    }

    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut le = true;
        let mut ge = true;

        for pid in self.entries.keys().chain(other.entries.keys()) {
            let a = self.get(pid).unwrap_or(0);
            let b = other.get(pid).unwrap_or(0);
            if a > b {
                le = false;
            }
            if a < b {
                ge = false;
            }
        }

        match (le, ge) {
            (true, true) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (false, false) => ClockOrdering::Concurrent,
        }
    }

    /// True if `self` causally precedes `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProcessId, &u64)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
