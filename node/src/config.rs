// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::Path;

use ledgercut_kernel::config::{BROADCAST_INTERVAL, INITIAL_BALANCE, MAX_BROADCAST_INTERVAL};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{NodeError, NodeResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Random when absent.
    pub process_id: Option<Uuid>,
    pub bind_addr: SocketAddr,
    /// Peers to connect to at startup.
    pub peers: Vec<SocketAddr>,
    /// Accounts opened locally at startup.
    pub accounts: Vec<String>,
    pub initial_balance: i64,
    /// Distance between the initiator's clock and the announced Mattern cut.
    pub broadcast_interval: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            process_id: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7400)),
            peers: Vec::new(),
            accounts: Vec::new(),
            initial_balance: INITIAL_BALANCE,
            broadcast_interval: BROADCAST_INTERVAL,
        }
    }
}

impl NodeConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> NodeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw).map_err(|e| NodeError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> NodeResult<()> {
        if self.broadcast_interval == 0 || self.broadcast_interval > MAX_BROADCAST_INTERVAL {
            return Err(NodeError::Config(format!(
                "broadcast_interval must be between 1 and {}, got {}",
                MAX_BROADCAST_INTERVAL, self.broadcast_interval
            )));
        }
        Ok(())
    }
}
