// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Per-channel send/receive accounting for Mattern termination.
//!
//! Each process counts, per peer, envelopes sent (+1) minus envelopes
//! received (-1). Counts are cumulative for the life of the process: a send
//! still in flight when a run starts must stay visible to that run. The
//! initiator sums the reported totals of the run's participants; the sum is
//! the number of messages that crossed the cut and have not been accounted.

use alloc::collections::{BTreeMap, BTreeSet};

use crate::types::ProcessId;

pub const SEND: i64 = 1;
pub const RECEIVE: i64 = -1;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelCounters {
    channels: BTreeMap<ProcessId, i64>,
}

impl ChannelCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_to(&mut self, peer: ProcessId) {
        *self.channels.entry(peer).or_insert(0) += SEND;
    }

    pub fn received_from(&mut self, peer: ProcessId) {
        *self.channels.entry(peer).or_insert(0) += RECEIVE;
    }

    pub fn channel(&self, peer: &ProcessId) -> i64 {
        self.channels.get(peer).copied().unwrap_or(0)
    }

    /// Signed send/receive counter of this process.
    pub fn total(&self) -> i64 {
        self.channels.values().sum()
    }

    /// Counter restricted to the channels towards `quorum`.
    pub fn total_within(&self, quorum: &BTreeSet<ProcessId>) -> i64 {
        self.channels
            .iter()
            .filter(|(peer, _)| quorum.contains(peer))
            .map(|(_, count)| *count)
            .sum()
    }
}
