// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Protocol constants.

/// Logical ticks between the initiator's current time and the Mattern cut.
pub const BROADCAST_INTERVAL: u64 = 100;

/// Largest accepted broadcast interval.
pub const MAX_BROADCAST_INTERVAL: u64 = 1 << 32;

/// Balance of a freshly opened account.
pub const INITIAL_BALANCE: i64 = 500;

/// Upper bound on one encoded envelope, in bytes.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;
