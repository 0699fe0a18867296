// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use ledgercut_kernel::error::KernelError;
use ledgercut_kernel::types::ProcessId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Kernel error: {0}")]
    Kernel(KernelError),
    #[error("Peer {0} disconnected")]
    PeerDisconnected(ProcessId),
    #[error("Mattern run superseded by a run announced by {0}")]
    Superseded(ProcessId),
    #[error("No link to peer {0}")]
    UnknownPeer(ProcessId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Bank process shut down")]
    Closed,
}

impl From<KernelError> for NodeError {
    fn from(e: KernelError) -> Self {
        NodeError::Kernel(e)
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
