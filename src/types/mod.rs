// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Identity types.

pub mod id;

pub use id::{AccountId, ProcessId};
pub use uuid::Uuid;
