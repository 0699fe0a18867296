// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Mattern's global snapshot algorithm.
//!
//! The initiator announces a future logical time for its own clock entry. The
//! cut is the state of every process at the moment its view of that entry
//! reaches the announced value. Processes and messages are coloured against
//! the cut:
//!
//! - **white**: the clock's entry for the initiator is below the future tick
//! - **red**: the entry has reached it
//!
//! A white process receiving a red message records its state before applying
//! the message. A red process receiving a white message reports the message
//! as in flight. The run terminates when every participant reported and the
//! summed send/receive counters net to zero.
//!
//! This module holds the bookkeeping only. [`crate::process::Process`] drives
//! it from the receive pipeline; the node runtime supplies waiting.

use alloc::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::envelope::Envelope;
use crate::error::{KernelError, KernelResult};
use crate::snapshot::{Algorithm, GlobalSnapshot, Snapshot};
use crate::types::ProcessId;

/// Defines the cut of one Mattern run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorInfo {
    pub initiator_id: ProcessId,
    pub future_tick: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White,
    Red,
}

impl InitiatorInfo {
    /// Colour of a clock relative to this cut.
    ///
    /// A clock without an entry for the initiator carries no causal
    /// information about the cut and is therefore white. The absent entry is
    /// never compared as a tick value.
    pub fn color_of(&self, clock: &VectorClock) -> Color {
        match clock.get(&self.initiator_id) {
            Some(ticks) if ticks >= self.future_tick => Color::Red,
            Some(_) | None => Color::White,
        }
    }
}

/// What the receive pipeline must do with an envelope before applying it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intercept {
    Pass,
    /// White process, red message: record the local cut first.
    RecordCut,
    /// Red process, white message: account the message as in flight.
    FoldWhite,
}

/// Processes that still owe an acknowledgement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AckRound {
    waiting: BTreeSet<ProcessId>,
}

impl AckRound {
    pub fn new(peers: &BTreeSet<ProcessId>) -> Self {
        Self {
            waiting: peers.clone(),
        }
    }

    /// Returns false if `from` was not expected.
    pub fn acknowledge(&mut self, from: &ProcessId) -> bool {
        self.waiting.remove(from)
    }

    pub fn is_complete(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn is_waiting_on(&self, peer: &ProcessId) -> bool {
        self.waiting.contains(peer)
    }
}

/// Initiator-side state of one run.
#[derive(Clone, Debug)]
struct InitiatorRun {
    info: InitiatorInfo,
    /// Peers taking part, fixed at run start. The initiator is implicit.
    quorum: BTreeSet<ProcessId>,
    acks: AckRound,
    local_recorded: bool,
    global_counter: i64,
    collected: GlobalSnapshot,
}

impl InitiatorRun {
    fn participants(&self) -> usize {
        self.quorum.len() + 1
    }

    fn involves(&self, peer: &ProcessId) -> bool {
        *peer == self.info.initiator_id || self.quorum.contains(peer)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MatternCoordinator {
    /// Cut of the latest run this process heard of.
    info: Option<InitiatorInfo>,
    /// Present only on the initiator while its run is active.
    run: Option<InitiatorRun>,
}

impl MatternCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> Option<&InitiatorInfo> {
        self.info.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.run.is_some()
    }

    /// Installs the cut announced by a `TAKE_SNAPSHOT`.
    pub fn install(&mut self, info: InitiatorInfo) {
        self.info = Some(info);
    }

    /// Decides the pre-apply action for `msg` arriving at a process whose
    /// clock is `local`. Pure: the same inputs always yield the same verdict.
    pub fn classify(&self, local: &VectorClock, msg: &Envelope) -> Intercept {
        if msg.command.is_handshake() {
            return Intercept::Pass;
        }
        let Some(info) = self.info.as_ref() else {
            return Intercept::Pass;
        };
        match (info.color_of(local), info.color_of(&msg.vector_clock)) {
            (Color::White, Color::Red) => Intercept::RecordCut,
            (Color::Red, Color::White) => Intercept::FoldWhite,
            _ => Intercept::Pass,
        }
    }

    /// Starts a run initiated by `self_id`, whose own clock entry is `now`.
    pub fn begin(
        &mut self,
        self_id: ProcessId,
        now: u64,
        interval: u64,
        quorum: BTreeSet<ProcessId>,
    ) -> KernelResult<InitiatorInfo> {
        if self.run.is_some() {
            return Err(KernelError::RunInProgress);
        }
        let info = InitiatorInfo {
            initiator_id: self_id,
            future_tick: now.saturating_add(interval.max(1)),
        };
        self.info = Some(info);
        self.run = Some(InitiatorRun {
            info,
            acks: AckRound::new(&quorum),
            quorum,
            local_recorded: false,
            global_counter: 0,
            collected: GlobalSnapshot::new(Algorithm::Mattern, self_id),
        });
        Ok(info)
    }

    /// Returns true if the acknowledgement was part of the active round.
    pub fn acknowledge(&mut self, from: &ProcessId) -> bool {
        match self.run.as_mut() {
            Some(run) => run.acks.acknowledge(from),
            None => false,
        }
    }

    pub fn acks_complete(&self) -> bool {
        self.run.as_ref().map_or(false, |run| run.acks.is_complete())
    }

    pub fn awaiting_ack_from(&self, peer: &ProcessId) -> bool {
        self.run.as_ref().map_or(false, |run| run.acks.is_waiting_on(peer))
    }

    /// Future tick of a run started here whose local cut is not yet recorded.
    pub fn pending_local_cut(&self) -> Option<u64> {
        self.run
            .as_ref()
            .filter(|run| !run.local_recorded)
            .map(|run| run.info.future_tick)
    }

    pub fn local_recorded(&self) -> bool {
        self.run.as_ref().map_or(false, |run| run.local_recorded)
    }

    /// Peers of the active run, for restricting the local counter.
    pub fn quorum(&self) -> Option<&BTreeSet<ProcessId>> {
        self.run.as_ref().map(|run| &run.quorum)
    }

    pub fn quorum_contains(&self, peer: &ProcessId) -> bool {
        self.run.as_ref().map_or(false, |run| run.quorum.contains(peer))
    }

    /// Records the initiator's own cut and folds its counter.
    pub fn record_initiator_cut(&mut self, snapshot: Snapshot, counter: i64) -> KernelResult<()> {
        let run = self.run.as_mut().ok_or(KernelError::NoActiveRun)?;
        if run.local_recorded {
            return Ok(());
        }
        run.collected.snapshots.insert(snapshot.owner, snapshot);
        run.global_counter += counter;
        run.local_recorded = true;
        Ok(())
    }

    /// Folds a participant's reported cut. Returns false if ignored.
    pub fn collect_snapshot(&mut self, from: ProcessId, snapshot: Snapshot, counter: i64) -> bool {
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        if !run.quorum.contains(&from) || run.collected.snapshots.contains_key(&from) {
            return false;
        }
        run.collected.snapshots.insert(from, snapshot);
        run.global_counter += counter;
        true
    }

    /// Accounts one in-flight message received by `receiver` after its cut.
    /// Returns false if ignored.
    pub fn fold_white(&mut self, receiver: ProcessId, msg: Envelope) -> bool {
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        if !run.involves(&receiver) || !run.involves(&msg.source_id) {
            return false;
        }
        run.global_counter -= 1;
        run.collected.white_messages.push(msg);
        true
    }

    pub fn global_counter(&self) -> Option<i64> {
        self.run.as_ref().map(|run| run.global_counter)
    }

    pub fn collected(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.collected.snapshots.len())
    }

    /// Termination predicate: every participant's cut is in and the summed
    /// send/receive counter is zero.
    pub fn terminated(&self) -> bool {
        match self.run.as_ref() {
            Some(run) => {
                run.local_recorded
                    && run.collected.snapshots.len() == run.participants()
                    && run.global_counter == 0
            }
            None => false,
        }
    }

    /// Takes the result of a terminated run and clears all run state.
    pub fn finish(&mut self) -> Option<GlobalSnapshot> {
        if !self.terminated() {
            return None;
        }
        self.info = None;
        self.run.take().map(|run| run.collected)
    }

    /// Drops the active run without publishing anything.
    pub fn abort(&mut self) {
        if self.run.take().is_some() {
            self.info = None;
        }
    }
}
