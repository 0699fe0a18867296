// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Local and global snapshot values.
//!
//! A [`Snapshot`] is the recorded state of one process for one run. A
//! [`GlobalSnapshot`] is what a run publishes: one snapshot per participant
//! plus, for Mattern runs, the messages that were in flight across the cut.

pub mod hash;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::envelope::{Command, Envelope};
use crate::types::{AccountId, ProcessId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub balance: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub owner: ProcessId,
    pub accounts: Vec<AccountSnapshot>,
}

impl Snapshot {
    pub fn total_balance(&self) -> i64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    pub fn balance_of(&self, account: &AccountId) -> Option<i64> {
        self.accounts
            .iter()
            .find(|a| &a.account_id == account)
            .map(|a| a.balance)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Mattern,
    ChandyLamport,
}

impl Algorithm {
    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::Mattern => "mattern",
            Algorithm::ChandyLamport => "chandy_lamport",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub algorithm: Algorithm,
    /// Process that started the run.
    pub initiator: ProcessId,
    pub snapshots: BTreeMap<ProcessId, Snapshot>,
    /// Messages sent before the cut and received after it.
    pub white_messages: Vec<Envelope>,
}

impl GlobalSnapshot {
    pub fn new(algorithm: Algorithm, initiator: ProcessId) -> Self {
        Self {
            algorithm,
            initiator,
            snapshots: BTreeMap::new(),
            white_messages: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Sum of every recorded balance.
    pub fn total_balance(&self) -> i64 {
        self.snapshots.values().map(Snapshot::total_balance).sum()
    }

    /// Net ledger amount carried by in-flight messages.
    pub fn in_flight(&self) -> i64 {
        self.white_messages
            .iter()
            .map(|msg| match (msg.command, msg.ledger_op()) {
                (Command::Deposit, Ok((_, amount))) => amount,
                (Command::Withdraw, Ok((_, amount))) => -amount,
                _ => 0,
            })
            .sum()
    }

    /// Recorded balances plus in-flight amounts; invariant under transfers.
    pub fn conserved_total(&self) -> i64 {
        self.total_balance() + self.in_flight()
    }

    pub fn digest(&self) -> [u8; 32] {
        hash::global_snapshot_hash(self)
    }
}
