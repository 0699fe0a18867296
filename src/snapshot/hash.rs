// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic hashing of collected cuts.

use crate::snapshot::{GlobalSnapshot, Snapshot};

/// Hash of one process snapshot. Accounts are hashed in recorded order.
pub fn snapshot_hash(snapshot: &Snapshot) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    feed_snapshot(&mut hasher, snapshot);
    *hasher.finalize().as_bytes()
}

/// Hash of a collected cut.
///
/// **Scope**: covers the recorded balances of every participant, keyed by
/// owner. It **excludes** the algorithm, the initiator and in-flight
/// messages, so processes that collected the same cut agree on the digest.
pub fn global_snapshot_hash(global: &GlobalSnapshot) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(global.snapshots.len() as u64).to_le_bytes());
    for snapshot in global.snapshots.values() {
        feed_snapshot(&mut hasher, snapshot);
    }
    *hasher.finalize().as_bytes()
}

fn feed_snapshot(hasher: &mut blake3::Hasher, snapshot: &Snapshot) {
    hasher.update(snapshot.owner.as_bytes());
    hasher.update(&(snapshot.accounts.len() as u64).to_le_bytes());
    for account in &snapshot.accounts {
        let id = account.account_id.as_str().as_bytes();
        hasher.update(&(id.len() as u64).to_le_bytes());
        hasher.update(id);
        hasher.update(&account.balance.to_le_bytes());
    }
}
