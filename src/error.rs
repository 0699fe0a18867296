// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use core::fmt;

use crate::envelope::Command;
use crate::types::{AccountId, ProcessId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Account is neither local nor registered by a peer.
    UnknownAccount(AccountId),
    /// Account already opened on this process.
    DuplicateAccount(AccountId),
    /// Ledger amounts are non-negative.
    InvalidAmount(i64),
    /// Balance arithmetic overflowed.
    Overflow,
    /// Payload does not match the envelope command.
    MalformedEnvelope(Command),
    /// Wire encoding failed.
    Encode,
    /// Wire decoding failed.
    Decode,
    /// A snapshot run of the same kind is still active.
    RunInProgress,
    /// Operation requires an active snapshot run.
    NoActiveRun,
    /// No registered link to this process.
    UnknownPeer(ProcessId),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::UnknownAccount(id) => write!(f, "unknown account {}", id),
            KernelError::DuplicateAccount(id) => write!(f, "account {} already open", id),
            KernelError::InvalidAmount(amount) => write!(f, "invalid amount {}", amount),
            KernelError::Overflow => f.write_str("balance overflow"),
            KernelError::MalformedEnvelope(cmd) => write!(f, "malformed {:?} envelope", cmd),
            KernelError::Encode => f.write_str("envelope encode failed"),
            KernelError::Decode => f.write_str("envelope decode failed"),
            KernelError::RunInProgress => f.write_str("snapshot run already in progress"),
            KernelError::NoActiveRun => f.write_str("no active snapshot run"),
            KernelError::UnknownPeer(id) => write!(f, "unknown peer {}", id),
        }
    }
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
