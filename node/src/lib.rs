// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Tokio runtime for one bank process: peer links, TCP transport and the
//! Mattern termination detector around the `ledgercut-kernel` state machines.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod network;
pub mod bank;
pub mod detector;

pub use bank::{Bank, MatternRun};
