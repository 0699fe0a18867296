// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Envelopes exchanged between bank processes.
//!
//! Every envelope carries the sender's identity and a copy of the sender's
//! vector clock taken when the send was stamped. The payload is typed, but the
//! command remains the authority: consumers call [`Envelope::validate`] (the
//! wire decoder does) and then use the accessor for the command they expect.

use alloc::boxed::Box;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::error::{KernelError, KernelResult};
use crate::snapshot::Snapshot;
use crate::types::{AccountId, ProcessId};

/// Closed set of envelope commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Register,
    RegisterResponse,
    Deposit,
    Withdraw,
    GetBalance,
    GetBalanceResponse,
    /// Mattern cut announcement.
    TakeSnapshot,
    Acknowledgement,
    /// Post-cut message forcing every channel to carry one red message.
    Dummy,
    /// Mattern: a process reports its cut to the initiator.
    Snapshot,
    /// Mattern: forwarded in-flight message.
    WhiteMessage,
    ChandyLamportMarker,
    ChandyLamportReset,
}

impl Command {
    /// Registration traffic is handshake plumbing, outside every snapshot run.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Command::Register | Command::RegisterResponse)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Command::Register => "register",
            Command::RegisterResponse => "register_response",
            Command::Deposit => "deposit",
            Command::Withdraw => "withdraw",
            Command::GetBalance => "get_balance",
            Command::GetBalanceResponse => "get_balance_response",
            Command::TakeSnapshot => "take_snapshot",
            Command::Acknowledgement => "acknowledgement",
            Command::Dummy => "dummy",
            Command::Snapshot => "snapshot",
            Command::WhiteMessage => "white_message",
            Command::ChandyLamportMarker => "chandy_lamport_marker",
            Command::ChandyLamportReset => "chandy_lamport_reset",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Empty,
    Accounts(Vec<AccountId>),
    LedgerOp { account_id: AccountId, amount: i64 },
    BalanceQuery { account_id: AccountId },
    /// `None` when the queried account is unknown to the responder.
    Balance { account_id: AccountId, amount: Option<i64> },
    FutureTick(u64),
    Snapshot { snapshot: Snapshot, msg_counter: i64 },
    WhiteMessage(Box<Envelope>),
    Marker(Snapshot),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: Command,
    pub source_id: ProcessId,
    pub vector_clock: VectorClock,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(command: Command, source_id: ProcessId, vector_clock: VectorClock, payload: Payload) -> Self {
        Self {
            command,
            source_id,
            vector_clock,
            payload,
        }
    }

    /// Checks that the payload is the one `command` requires.
    pub fn validate(&self) -> KernelResult<()> {
        let ok = match (self.command, &self.payload) {
            (Command::Register | Command::RegisterResponse, Payload::Accounts(_)) => true,
            (Command::Deposit | Command::Withdraw, Payload::LedgerOp { amount, .. }) => *amount >= 0,
            (Command::GetBalance, Payload::BalanceQuery { .. }) => true,
            (Command::GetBalanceResponse, Payload::Balance { .. }) => true,
            (Command::TakeSnapshot, Payload::FutureTick(_)) => true,
            (Command::Snapshot, Payload::Snapshot { snapshot, .. }) => snapshot.owner == self.source_id,
            (Command::WhiteMessage, Payload::WhiteMessage(inner)) => inner.validate().is_ok(),
            (Command::ChandyLamportMarker, Payload::Marker(snapshot)) => snapshot.owner == self.source_id,
            (
                Command::Acknowledgement | Command::Dummy | Command::ChandyLamportReset,
                Payload::Empty,
            ) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(KernelError::MalformedEnvelope(self.command))
        }
    }

    fn malformed<T>(&self) -> KernelResult<T> {
        Err(KernelError::MalformedEnvelope(self.command))
    }

    pub fn accounts(&self) -> KernelResult<&[AccountId]> {
        match (&self.command, &self.payload) {
            (Command::Register | Command::RegisterResponse, Payload::Accounts(ids)) => Ok(ids),
            _ => self.malformed(),
        }
    }

    pub fn ledger_op(&self) -> KernelResult<(&AccountId, i64)> {
        match (&self.command, &self.payload) {
            (Command::Deposit | Command::Withdraw, Payload::LedgerOp { account_id, amount }) => {
                Ok((account_id, *amount))
            }
            _ => self.malformed(),
        }
    }

    pub fn balance_query(&self) -> KernelResult<&AccountId> {
        match (&self.command, &self.payload) {
            (Command::GetBalance, Payload::BalanceQuery { account_id }) => Ok(account_id),
            _ => self.malformed(),
        }
    }

    pub fn balance_reply(&self) -> KernelResult<(&AccountId, Option<i64>)> {
        match (&self.command, &self.payload) {
            (Command::GetBalanceResponse, Payload::Balance { account_id, amount }) => {
                Ok((account_id, *amount))
            }
            _ => self.malformed(),
        }
    }

    pub fn future_tick(&self) -> KernelResult<u64> {
        match (&self.command, &self.payload) {
            (Command::TakeSnapshot, Payload::FutureTick(tick)) => Ok(*tick),
            _ => self.malformed(),
        }
    }

    pub fn snapshot_report(&self) -> KernelResult<(&Snapshot, i64)> {
        match (&self.command, &self.payload) {
            (Command::Snapshot, Payload::Snapshot { snapshot, msg_counter }) => Ok((snapshot, *msg_counter)),
            _ => self.malformed(),
        }
    }

    pub fn white_message(&self) -> KernelResult<&Envelope> {
        match (&self.command, &self.payload) {
            (Command::WhiteMessage, Payload::WhiteMessage(inner)) => Ok(inner),
            _ => self.malformed(),
        }
    }

    pub fn marker(&self) -> KernelResult<&Snapshot> {
        match (&self.command, &self.payload) {
            (Command::ChandyLamportMarker, Payload::Marker(snapshot)) => Ok(snapshot),
            _ => self.malformed(),
        }
    }
}
