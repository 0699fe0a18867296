// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![no_std]

//! ledgercut-kernel: sans-IO protocol core for a network of bank branches.
//!
//! Vector clocks, the Mattern and Chandy-Lamport global snapshot algorithms,
//! and the per-process dispatch that ties them to a local ledger. Nothing in
//! this crate performs I/O; the node runtime owns the transport and the lock.

extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod config;
pub mod error;
pub mod types;
pub mod clock;
pub mod ledger;
pub mod snapshot;
pub mod envelope;
pub mod wire;
pub mod counter;
pub mod mattern;
pub mod marker;
pub mod process;

#[cfg(test)]
pub mod tests;
