// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! One bank process hosted on tokio.
//!
//! All protocol state lives in a kernel [`Process`] behind a single
//! `tokio::sync::Mutex`. Every inbound envelope is classified, merged and
//! applied under that lock. Waiters (acknowledgement rounds, the termination
//! detector, peer counts) park on a shared `Notify` that is signalled after
//! every state change.

use std::collections::BTreeMap;
use std::sync::Arc;

use ledgercut_kernel::envelope::Envelope;
use ledgercut_kernel::process::{BalanceLookup, Effects, Notice, Outbound, Process};
use ledgercut_kernel::snapshot::{Algorithm, GlobalSnapshot};
use ledgercut_kernel::types::{AccountId, ProcessId};
use tokio::sync::{broadcast, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::detector;
use crate::errors::{NodeError, NodeResult};
use crate::network::{Inbound, Link};

const PUBLISH_CAPACITY: usize = 16;

type BalanceWaiters = BTreeMap<(ProcessId, AccountId), Vec<oneshot::Sender<Option<i64>>>>;

pub struct BankState {
    pub(crate) process: Process,
    links: BTreeMap<ProcessId, Link>,
    balance_waiters: BalanceWaiters,
    /// Why the current Mattern run was dropped.
    pub(crate) mattern_abort: Option<NodeError>,
    /// Why the current marker reset or run was dropped.
    marker_abort: Option<NodeError>,
    closed: bool,
}

impl BankState {
    fn send(&mut self, out: Outbound) -> NodeResult<()> {
        let command = out.envelope.command;
        let link = self.links.get(&out.to).ok_or(NodeError::UnknownPeer(out.to))?;
        link.send(out.envelope)
            .map_err(|_| NodeError::PeerDisconnected(out.to))?;
        metrics::increment_counter!("ledgercut_envelopes_sent_total", "command" => command.label());
        Ok(())
    }

    /// Sends every envelope; the first failure is returned after the rest
    /// were attempted.
    fn send_all(&mut self, outbound: Vec<Outbound>) -> NodeResult<()> {
        let mut first_err = None;
        for out in outbound {
            if let Err(e) = self.send(out) {
                tracing::warn!("Send failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<BankState>,
    pub(crate) notify: Notify,
    pub(crate) published: broadcast::Sender<GlobalSnapshot>,
}

/// Cloneable handle to a bank process.
#[derive(Clone)]
pub struct Bank {
    pub(crate) shared: Arc<Shared>,
    id: ProcessId,
}

/// A Mattern run started by this process.
pub struct MatternRun {
    rx: oneshot::Receiver<NodeResult<GlobalSnapshot>>,
    detector: JoinHandle<()>,
}

impl MatternRun {
    /// Waits for the termination detector to publish the cut.
    pub async fn wait(self) -> NodeResult<GlobalSnapshot> {
        let result = self.rx.await.map_err(|_| NodeError::Closed)?;
        let _ = self.detector.await;
        result
    }
}

impl Bank {
    pub fn new(cfg: &NodeConfig) -> NodeResult<Self> {
        cfg.validate()?;
        let id = ProcessId(cfg.process_id.unwrap_or_else(Uuid::new_v4));
        let mut process = Process::with_interval(id, cfg.broadcast_interval);
        for account in &cfg.accounts {
            process.open_account(AccountId::from(account.as_str()), cfg.initial_balance)?;
        }
        let (published, _) = broadcast::channel(PUBLISH_CAPACITY);
        let state = BankState {
            process,
            links: BTreeMap::new(),
            balance_waiters: BTreeMap::new(),
            mattern_abort: None,
            marker_abort: None,
            closed: false,
        };
        tracing::info!("Bank process {} opened {} account(s)", id, cfg.accounts.len());
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                notify: Notify::new(),
                published,
            }),
            id,
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GlobalSnapshot> {
        self.shared.published.subscribe()
    }

    pub async fn peers(&self) -> Vec<ProcessId> {
        self.shared.state.lock().await.process.peers().iter().copied().collect()
    }

    pub async fn accounts(&self) -> Vec<AccountId> {
        self.shared.state.lock().await.process.ledger().account_ids()
    }

    /// Waits until at least `n` peers completed registration.
    pub async fn wait_for_peers(&self, n: usize) -> NodeResult<()> {
        self.wait_for(|st| (st.process.peers().len() >= n).then_some(Ok(()))).await
    }

    // --- Ledger ---

    pub async fn open_account(&self, account: AccountId, balance: i64) -> NodeResult<()> {
        let mut st = self.shared.state.lock().await;
        st.process.open_account(account.clone(), balance)?;
        tracing::info!("Opened account {} with balance {}", account, balance);
        Ok(())
    }

    pub async fn deposit(&self, account: &AccountId, amount: i64) -> NodeResult<()> {
        let mut st = self.shared.state.lock().await;
        if let Some(out) = st.process.deposit(account, amount)? {
            tracing::debug!("Routing deposit on {} to {}", account, out.to);
            st.send(out)?;
        }
        Ok(())
    }

    pub async fn withdraw(&self, account: &AccountId, amount: i64) -> NodeResult<()> {
        let mut st = self.shared.state.lock().await;
        if let Some(out) = st.process.withdraw(account, amount)? {
            tracing::debug!("Routing withdraw on {} to {}", account, out.to);
            st.send(out)?;
        }
        Ok(())
    }

    /// Withdraw followed by deposit, stamped under one lock so no cut falls
    /// between them. Not transactional across the network: a lost deposit
    /// leaves the withdraw applied.
    pub async fn transfer(&self, from: &AccountId, to: &AccountId, amount: i64) -> NodeResult<()> {
        let mut st = self.shared.state.lock().await;
        let outbound = st.process.transfer(from, to, amount)?;
        st.send_all(outbound)
    }

    pub async fn balance(&self, account: &AccountId) -> NodeResult<i64> {
        let rx = {
            let mut st = self.shared.state.lock().await;
            match st.process.balance(account)? {
                BalanceLookup::Local(amount) => return Ok(amount),
                BalanceLookup::Remote(query) => {
                    let owner = query.to;
                    let (tx, rx) = oneshot::channel();
                    st.balance_waiters
                        .entry((owner, account.clone()))
                        .or_default()
                        .push(tx);
                    st.send(query)?;
                    (owner, rx)
                }
            }
        };
        let (owner, rx) = rx;
        match rx.await {
            Ok(Some(amount)) => Ok(amount),
            Ok(None) => Err(NodeError::Kernel(
                ledgercut_kernel::error::KernelError::UnknownAccount(account.clone()),
            )),
            Err(_) => Err(NodeError::PeerDisconnected(owner)),
        }
    }

    // --- Links ---

    /// Serves one bidirectional link until its inbound side closes.
    /// The connecting side sends `REGISTER`.
    pub fn attach(&self, link: Link, mut inbound: Inbound, initiate: bool) -> JoinHandle<()> {
        let bank = self.clone();
        tokio::spawn(async move {
            if initiate {
                let register = bank.shared.state.lock().await.process.register_envelope();
                if link.send(register).is_err() {
                    tracing::warn!("Link closed before registration");
                    return;
                }
            }
            // Moves into the link table on the first envelope; the reader must
            // not keep the link alive on its own.
            let mut pending = Some(link);
            let mut peer = None;
            while let Some(envelope) = inbound.recv().await {
                if let Some(link) = pending.take() {
                    if !envelope.command.is_handshake() {
                        tracing::warn!("Dropping {:?} before registration", envelope.command);
                        pending = Some(link);
                        continue;
                    }
                    if !bank.adopt(envelope.source_id, link).await {
                        return;
                    }
                    peer = Some(envelope.source_id);
                }
                bank.receive(envelope).await;
            }
            if let Some(peer) = peer {
                bank.peer_lost(peer).await;
            }
        })
    }

    async fn adopt(&self, peer: ProcessId, link: Link) -> bool {
        let mut st = self.shared.state.lock().await;
        if st.closed {
            return false;
        }
        if st.links.insert(peer, link).is_some() {
            tracing::warn!("Replacing existing link to {}", peer);
        }
        true
    }

    async fn receive(&self, envelope: Envelope) {
        metrics::increment_counter!("ledgercut_envelopes_received_total", "command" => envelope.command.label());
        let mut st = self.shared.state.lock().await;
        let command = envelope.command;
        let from = envelope.source_id;
        match st.process.on_envelope(envelope) {
            Ok(fx) => self.apply(&mut st, fx),
            Err(e) => tracing::warn!("Rejected {:?} from {}: {}", command, from, e),
        }
        drop(st);
        self.shared.notify.notify_waiters();
    }

    async fn peer_lost(&self, peer: ProcessId) {
        let mut st = self.shared.state.lock().await;
        st.links.remove(&peer);
        st.balance_waiters.retain(|(owner, _), _| *owner != peer);
        let notices = st.process.peer_lost(&peer);
        tracing::info!("Peer {} disconnected", peer);
        self.apply(
            &mut st,
            Effects {
                outbound: Vec::new(),
                notices,
            },
        );
        metrics::gauge!("ledgercut_peers", st.process.peers().len() as f64);
        drop(st);
        self.shared.notify.notify_waiters();
    }

    /// Drops every link. Peers observe the closed links as disconnects.
    pub async fn shutdown(&self) {
        let mut st = self.shared.state.lock().await;
        st.closed = true;
        st.links.clear();
        tracing::info!("Bank process {} shutting down", self.id);
    }

    fn apply(&self, st: &mut BankState, fx: Effects) {
        for notice in fx.notices {
            match notice {
                Notice::Registered { peer, accounts } => {
                    tracing::info!("Registered peer {} with {} account(s)", peer, accounts.len());
                    metrics::gauge!("ledgercut_peers", st.process.peers().len() as f64);
                }
                Notice::Acknowledged { from } => tracing::debug!("Acknowledgement from {}", from),
                Notice::BalanceReply { from, account, amount } => {
                    if let Some(waiters) = st.balance_waiters.remove(&(from, account)) {
                        for tx in waiters {
                            let _ = tx.send(amount);
                        }
                    }
                }
                Notice::CutRecorded { algorithm } => {
                    tracing::debug!("Recorded local state for {} run", algorithm.label());
                }
                Notice::MatternProgress => {}
                Notice::Published(cut) => self.publish(cut),
                Notice::LedgerRejected(e) => tracing::warn!("Remote ledger operation rejected: {}", e),
                Notice::RunAborted { algorithm, peer } => {
                    tracing::warn!("{} run aborted: peer {} lost", algorithm.label(), peer);
                    metrics::increment_counter!("ledgercut_snapshot_runs_aborted_total", "algorithm" => algorithm.label());
                    let reason = Some(NodeError::PeerDisconnected(peer));
                    match algorithm {
                        Algorithm::Mattern => st.mattern_abort = reason,
                        Algorithm::ChandyLamport => st.marker_abort = reason,
                    }
                }
                Notice::RunSuperseded { by } => {
                    tracing::warn!("Mattern run dropped: {} announced another run", by);
                    metrics::increment_counter!("ledgercut_snapshot_runs_aborted_total", "algorithm" => Algorithm::Mattern.label());
                    st.mattern_abort = Some(NodeError::Superseded(by));
                }
                Notice::ProtocolViolation(reason) => tracing::warn!("Protocol violation ignored: {}", reason),
            }
        }
        if let Err(e) = st.send_all(fx.outbound) {
            tracing::warn!("Dropped outbound envelopes: {}", e);
        }
    }

    pub(crate) fn publish(&self, cut: GlobalSnapshot) {
        tracing::info!(
            "Published {} snapshot: {} process(es), total balance {}",
            cut.algorithm.label(),
            cut.len(),
            cut.total_balance()
        );
        metrics::increment_counter!("ledgercut_snapshot_runs_completed_total", "algorithm" => cut.algorithm.label());
        // No subscribers is not an error.
        let _ = self.shared.published.send(cut);
    }

    /// Parks until `check` yields a result. `check` runs under the lock and
    /// is re-evaluated after every notification.
    pub(crate) async fn wait_for<T, F>(&self, mut check: F) -> NodeResult<T>
    where
        F: FnMut(&mut BankState) -> Option<NodeResult<T>>,
    {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.shared.state.lock().await;
                if let Some(result) = check(&mut st) {
                    return result;
                }
            }
            notified.await;
        }
    }

    // --- Snapshots ---

    /// Runs the Mattern initiator protocol up to the dummy broadcast and
    /// hands the rest to the termination detector.
    pub async fn start_mattern(&self) -> NodeResult<MatternRun> {
        {
            let mut st = self.shared.state.lock().await;
            let announce = st.process.begin_mattern()?;
            st.mattern_abort = None;
            let future_tick = st.process.mattern().info().map(|info| info.future_tick);
            tracing::info!("Mattern run started, cut at {:?}", future_tick);
            if let Err(e) = st.send_all(announce) {
                st.process.abort_mattern();
                return Err(e);
            }
        }
        metrics::increment_counter!("ledgercut_snapshot_runs_started_total", "algorithm" => Algorithm::Mattern.label());

        self.wait_for(|st| {
            if let Some(e) = st.mattern_abort.take() {
                return Some(Err(e));
            }
            st.process.mattern_acks_complete().then_some(Ok(()))
        })
        .await?;

        {
            let mut st = self.shared.state.lock().await;
            let dummies = st.process.complete_initiator_cut()?;
            tracing::debug!("All acknowledgements in; local cut recorded");
            if let Err(e) = st.send_all(dummies) {
                st.process.abort_mattern();
                return Err(e);
            }
        }
        self.shared.notify.notify_waiters();

        let (tx, rx) = oneshot::channel();
        let detector = detector::spawn(self.clone(), tx);
        Ok(MatternRun { rx, detector })
    }

    /// Resets every peer, then records local state and broadcasts markers.
    /// Completion is published to subscribers.
    pub async fn start_chandy_lamport(&self) -> NodeResult<()> {
        {
            let mut st = self.shared.state.lock().await;
            let reset = st.process.begin_marker_reset()?;
            st.marker_abort = None;
            if let Err(e) = st.send_all(reset) {
                st.process.abort_marker();
                return Err(e);
            }
        }
        metrics::increment_counter!("ledgercut_snapshot_runs_started_total", "algorithm" => Algorithm::ChandyLamport.label());

        self.wait_for(|st| {
            if let Some(e) = st.marker_abort.take() {
                return Some(Err(e));
            }
            st.process.marker_reset_complete().then_some(Ok(()))
        })
        .await?;

        let mut st = self.shared.state.lock().await;
        let fx = st.process.start_marker()?;
        tracing::info!(
            "Chandy-Lamport run started, awaiting markers from {} neighbour(s)",
            st.process.marker().pending().count()
        );
        self.apply(&mut st, fx);
        Ok(())
    }
}
