// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chandy-Lamport marker snapshots.
//!
//! # Phases
//! - `Idle`: no run; the first marker or a local start begins one
//! - `Recording`: local state recorded, waiting for one marker per neighbour
//! - `Done`: every neighbour reported; the cut is assembled until `reset`
//!
//! Channels are assumed FIFO and lossless. Each marker carries the sender's
//! recorded state, so the marker table doubles as the collected cut.

use alloc::collections::{BTreeMap, BTreeSet};

use crate::error::{KernelError, KernelResult};
use crate::snapshot::{Algorithm, GlobalSnapshot, Snapshot};
use crate::types::ProcessId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerPhase {
    Idle,
    Recording,
    Done,
}

/// Result of feeding one event to the marker machine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkerOutcome {
    /// Marker to send on every outgoing channel.
    pub broadcast: Option<Snapshot>,
    pub completed: Option<GlobalSnapshot>,
    /// Set when the event was ignored as a protocol violation.
    pub violation: Option<&'static str>,
}

impl MarkerOutcome {
    fn violation(reason: &'static str) -> Self {
        Self {
            violation: Some(reason),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct MarkerSnapshot {
    owner: ProcessId,
    phase: MarkerPhase,
    /// Process whose start or marker began the current run.
    trigger: Option<ProcessId>,
    local: Option<Snapshot>,
    table: BTreeMap<ProcessId, Option<Snapshot>>,
}

impl MarkerSnapshot {
    pub fn new(owner: ProcessId) -> Self {
        Self {
            owner,
            phase: MarkerPhase::Idle,
            trigger: None,
            local: None,
            table: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> MarkerPhase {
        self.phase
    }

    pub fn local(&self) -> Option<&Snapshot> {
        self.local.as_ref()
    }

    pub fn table(&self) -> &BTreeMap<ProcessId, Option<Snapshot>> {
        &self.table
    }

    /// Neighbours whose marker has not arrived yet.
    pub fn pending(&self) -> impl Iterator<Item = &ProcessId> {
        self.table
            .iter()
            .filter(|(_, state)| state.is_none())
            .map(|(id, _)| id)
    }

    /// Local initiation.
    pub fn start(&mut self, local: Snapshot, neighbours: &BTreeSet<ProcessId>) -> KernelResult<MarkerOutcome> {
        if self.phase != MarkerPhase::Idle {
            return Err(KernelError::RunInProgress);
        }
        self.enter_recording(self.owner, local.clone(), neighbours);
        let mut outcome = MarkerOutcome::default();
        if !neighbours.is_empty() {
            outcome.broadcast = Some(local);
        }
        outcome.completed = self.try_complete();
        Ok(outcome)
    }

    /// Marker from neighbour `from` carrying its recorded state.
    ///
    /// `local` is only called when this marker is the first of the run.
    pub fn on_marker<F>(
        &mut self,
        from: ProcessId,
        carried: Snapshot,
        local: F,
        neighbours: &BTreeSet<ProcessId>,
    ) -> MarkerOutcome
    where
        F: FnOnce() -> Snapshot,
    {
        match self.phase {
            MarkerPhase::Idle => {
                if !neighbours.contains(&from) {
                    return MarkerOutcome::violation("marker from a process that is not a neighbour");
                }
                let state = local();
                self.enter_recording(from, state.clone(), neighbours);
                self.table.insert(from, Some(carried));
                MarkerOutcome {
                    broadcast: Some(state),
                    completed: self.try_complete(),
                    violation: None,
                }
            }
            MarkerPhase::Recording => {
                let Some(entry) = self.table.get_mut(&from) else {
                    return MarkerOutcome::violation("marker on a channel unknown at run start");
                };
                let duplicate = entry.is_some();
                *entry = Some(carried);
                MarkerOutcome {
                    broadcast: None,
                    completed: self.try_complete(),
                    violation: duplicate.then_some("duplicate marker on one channel"),
                }
            }
            MarkerPhase::Done => MarkerOutcome::violation("marker received after the run completed"),
        }
    }

    /// Drops every run-scoped field and returns to `Idle`. Idempotent.
    pub fn reset(&mut self) {
        self.phase = MarkerPhase::Idle;
        self.trigger = None;
        self.local = None;
        self.table.clear();
    }

    /// Drops a channel whose peer left. A run waiting on it can never
    /// complete, so it is reset; returns true in that case.
    pub fn forget(&mut self, peer: &ProcessId) -> bool {
        if self.phase == MarkerPhase::Recording && self.table.contains_key(peer) {
            self.reset();
            return true;
        }
        false
    }

    fn enter_recording(&mut self, trigger: ProcessId, local: Snapshot, neighbours: &BTreeSet<ProcessId>) {
        self.phase = MarkerPhase::Recording;
        self.trigger = Some(trigger);
        self.local = Some(local);
        self.table = neighbours.iter().map(|id| (*id, None)).collect();
    }

    fn try_complete(&mut self) -> Option<GlobalSnapshot> {
        if self.phase != MarkerPhase::Recording || self.table.values().any(Option::is_none) {
            return None;
        }
        let mut cut = GlobalSnapshot::new(Algorithm::ChandyLamport, self.trigger.unwrap_or(self.owner));
        if let Some(local) = self.local.clone() {
            cut.snapshots.insert(self.owner, local);
        }
        for (id, state) in &self.table {
            if let Some(state) = state {
                cut.snapshots.insert(*id, state.clone());
            }
        }
        self.phase = MarkerPhase::Done;
        Some(cut)
    }
}
