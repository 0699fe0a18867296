// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Peer links.
//!
//! A link is an unbounded FIFO of envelopes towards one peer. A send error
//! means the peer is gone.
pub mod memory;
pub mod tcp;

use ledgercut_kernel::envelope::Envelope;
use tokio::sync::mpsc;

pub type Link = mpsc::UnboundedSender<Envelope>;
pub type Inbound = mpsc::UnboundedReceiver<Envelope>;
