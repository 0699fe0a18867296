// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Mattern termination detection.
//!
//! One task per run. It parks on the bank's `Notify` and re-checks the
//! predicate under the process lock after every state change: all cuts
//! collected and the summed send/receive counter at zero.

use ledgercut_kernel::snapshot::GlobalSnapshot;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bank::{Bank, BankState};
use crate::errors::{NodeError, NodeResult};

pub(crate) fn spawn(bank: Bank, tx: oneshot::Sender<NodeResult<GlobalSnapshot>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = bank.wait_for(poll_termination).await;
        match &result {
            Ok(cut) => {
                metrics::counter!("ledgercut_white_messages_total", cut.white_messages.len() as u64);
                bank.publish(cut.clone());
            }
            Err(e) => tracing::warn!("Mattern run failed: {}", e),
        }
        let _ = tx.send(result);
    })
}

fn poll_termination(st: &mut BankState) -> Option<NodeResult<GlobalSnapshot>> {
    if let Some(e) = st.mattern_abort.take() {
        return Some(Err(e));
    }
    if !st.process.mattern().is_active() {
        return Some(Err(NodeError::Kernel(
            ledgercut_kernel::error::KernelError::NoActiveRun,
        )));
    }
    tracing::trace!(
        "Termination check: {} cut(s), counter {:?}",
        st.process.mattern().collected(),
        st.process.mattern().global_counter()
    );
    st.process.finish_mattern().map(Ok)
}
