// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! One bank process, without I/O.
//!
//! `Process` owns the vector clock, the ledger, the channel counters and both
//! snapshot engines. Every method takes `&mut self`; the runtime holds one lock
//! around the whole value, which makes "classify, merge, apply" atomic per
//! envelope.
//!
//! Methods never send. They return [`Outbound`] envelopes that are already
//! stamped and counted, plus [`Notice`]s the runtime reacts to.
//!
//! # Receive pipeline
//! 1. validate the envelope
//! 2. Mattern intercept against the *unmerged* local clock; an initiator
//!    whose cut falls on this receive records it here
//! 3. count the receive
//! 4. merge the sender's clock, then tick
//! 5. send the cut report / forward the white message
//! 6. apply the payload

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::clock::VectorClock;
use crate::config::BROADCAST_INTERVAL;
use crate::counter::ChannelCounters;
use crate::envelope::{Command, Envelope, Payload};
use crate::error::{KernelError, KernelResult};
use crate::ledger::Ledger;
use crate::marker::{MarkerOutcome, MarkerPhase, MarkerSnapshot};
use crate::mattern::{AckRound, InitiatorInfo, Intercept, MatternCoordinator};
use crate::snapshot::{Algorithm, GlobalSnapshot, Snapshot};
use crate::types::{AccountId, ProcessId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub to: ProcessId,
    pub envelope: Envelope,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Registered { peer: ProcessId, accounts: Vec<AccountId> },
    Acknowledged { from: ProcessId },
    BalanceReply { from: ProcessId, account: AccountId, amount: Option<i64> },
    /// Local state recorded for a run.
    CutRecorded { algorithm: Algorithm },
    /// Initiator bookkeeping changed; the termination predicate may now hold.
    MatternProgress,
    Published(GlobalSnapshot),
    /// A remote ledger operation could not be applied here.
    LedgerRejected(KernelError),
    RunAborted { algorithm: Algorithm, peer: ProcessId },
    /// Another process announced a Mattern run while one started here was
    /// active. The local run is dropped.
    RunSuperseded { by: ProcessId },
    ProtocolViolation(&'static str),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Effects {
    pub outbound: Vec<Outbound>,
    pub notices: Vec<Notice>,
}

/// Where a balance query is answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BalanceLookup {
    Local(i64),
    Remote(Outbound),
}

#[derive(Clone, Debug)]
pub struct Process {
    id: ProcessId,
    clock: VectorClock,
    ledger: Ledger,
    peers: BTreeSet<ProcessId>,
    remote_accounts: BTreeMap<AccountId, ProcessId>,
    counters: ChannelCounters,
    mattern: MatternCoordinator,
    marker: MarkerSnapshot,
    /// Chandy-Lamport reset round started by this process.
    reset_round: Option<AckRound>,
    broadcast_interval: u64,
}

impl Process {
    pub fn new(id: ProcessId) -> Self {
        Self::with_interval(id, BROADCAST_INTERVAL)
    }

    pub fn with_interval(id: ProcessId, broadcast_interval: u64) -> Self {
        Self {
            id,
            clock: VectorClock::new(),
            ledger: Ledger::new(),
            peers: BTreeSet::new(),
            remote_accounts: BTreeMap::new(),
            counters: ChannelCounters::new(),
            mattern: MatternCoordinator::new(),
            marker: MarkerSnapshot::new(id),
            reset_round: None,
            broadcast_interval,
        }
    }

    // --- Read APIs ---

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn peers(&self) -> &BTreeSet<ProcessId> {
        &self.peers
    }

    pub fn counters(&self) -> &ChannelCounters {
        &self.counters
    }

    pub fn mattern(&self) -> &MatternCoordinator {
        &self.mattern
    }

    pub fn marker(&self) -> &MarkerSnapshot {
        &self.marker
    }

    pub fn owner_of(&self, account: &AccountId) -> Option<ProcessId> {
        if self.ledger.contains(account) {
            Some(self.id)
        } else {
            self.remote_accounts.get(account).copied()
        }
    }

    // --- Stamping ---

    /// Local event. While a Mattern run started here has not recorded its
    /// cut, the tick that would reach the future tick records it first.
    fn tick(&mut self) {
        if self.next_tick_reaches_cut(0) {
            self.record_initiator_cut();
        }
        self.clock.tick(self.id);
    }

    /// True if the next tick of the own entry, after merging a clock whose
    /// view of it is `seen`, lands on the pending local cut.
    fn next_tick_reaches_cut(&self, seen: u64) -> bool {
        match self.mattern.pending_local_cut() {
            Some(future_tick) => {
                let now = self.clock.get(&self.id).unwrap_or(0).max(seen);
                now.saturating_add(1) >= future_tick
            }
            None => false,
        }
    }

    fn stamp(&mut self, command: Command, payload: Payload) -> Envelope {
        self.tick();
        Envelope::new(command, self.id, self.clock.clone(), payload)
    }

    fn send(&mut self, to: ProcessId, command: Command, payload: Payload) -> Outbound {
        let envelope = self.stamp(command, payload);
        if !command.is_handshake() {
            self.counters.sent_to(to);
        }
        Outbound { to, envelope }
    }

    fn broadcast(&mut self, command: Command, payload: Payload) -> Vec<Outbound> {
        let peers: Vec<ProcessId> = self.peers.iter().copied().collect();
        peers
            .into_iter()
            .map(|peer| self.send(peer, command, payload.clone()))
            .collect()
    }

    // --- Ledger operations ---

    pub fn open_account(&mut self, account: AccountId, balance: i64) -> KernelResult<()> {
        self.ledger.open(account, balance)
    }

    pub fn deposit(&mut self, account: &AccountId, amount: i64) -> KernelResult<Option<Outbound>> {
        self.ledger_op(Command::Deposit, account, amount)
    }

    pub fn withdraw(&mut self, account: &AccountId, amount: i64) -> KernelResult<Option<Outbound>> {
        self.ledger_op(Command::Withdraw, account, amount)
    }

    /// Withdraw on `from`, then deposit on `to`, as consecutive local events.
    /// Both accounts are resolved before anything is applied.
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: i64) -> KernelResult<Vec<Outbound>> {
        for account in [from, to] {
            if self.owner_of(account).is_none() {
                return Err(KernelError::UnknownAccount(account.clone()));
            }
        }
        let mut outbound = Vec::new();
        outbound.extend(self.withdraw(from, amount)?);
        outbound.extend(self.deposit(to, amount)?);
        Ok(outbound)
    }

    fn ledger_op(&mut self, command: Command, account: &AccountId, amount: i64) -> KernelResult<Option<Outbound>> {
        if amount < 0 {
            return Err(KernelError::InvalidAmount(amount));
        }
        if self.ledger.contains(account) {
            self.tick();
            match command {
                Command::Deposit => self.ledger.deposit(account, amount)?,
                _ => self.ledger.withdraw(account, amount)?,
            };
            return Ok(None);
        }
        let owner = *self
            .remote_accounts
            .get(account)
            .ok_or_else(|| KernelError::UnknownAccount(account.clone()))?;
        let payload = Payload::LedgerOp {
            account_id: account.clone(),
            amount,
        };
        Ok(Some(self.send(owner, command, payload)))
    }

    pub fn balance(&mut self, account: &AccountId) -> KernelResult<BalanceLookup> {
        if self.ledger.contains(account) {
            return Ok(BalanceLookup::Local(self.ledger.balance(account)?));
        }
        let owner = *self
            .remote_accounts
            .get(account)
            .ok_or_else(|| KernelError::UnknownAccount(account.clone()))?;
        let payload = Payload::BalanceQuery {
            account_id: account.clone(),
        };
        Ok(BalanceLookup::Remote(self.send(owner, Command::GetBalance, payload)))
    }

    // --- Registration ---

    /// `REGISTER` for a freshly connected link, whose peer id is not yet known.
    pub fn register_envelope(&mut self) -> Envelope {
        let accounts = self.ledger.account_ids();
        self.stamp(Command::Register, Payload::Accounts(accounts))
    }

    fn register_peer(&mut self, peer: ProcessId, accounts: &[AccountId], fx: &mut Effects) {
        self.peers.insert(peer);
        for account in accounts {
            if !self.ledger.contains(account) {
                self.remote_accounts.insert(account.clone(), peer);
            }
        }
        fx.notices.push(Notice::Registered {
            peer,
            accounts: accounts.to_vec(),
        });
    }

    /// Removes a peer whose link closed and aborts runs that depended on it.
    pub fn peer_lost(&mut self, peer: &ProcessId) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !self.peers.remove(peer) {
            return notices;
        }
        self.remote_accounts.retain(|_, owner| owner != peer);
        if self.mattern.quorum_contains(peer) {
            self.mattern.abort();
            notices.push(Notice::RunAborted {
                algorithm: Algorithm::Mattern,
                peer: *peer,
            });
        }
        let resetting = self
            .reset_round
            .as_ref()
            .map_or(false, |round| round.is_waiting_on(peer));
        if resetting || self.marker.forget(peer) {
            self.reset_round = None;
            self.marker.reset();
            notices.push(Notice::RunAborted {
                algorithm: Algorithm::ChandyLamport,
                peer: *peer,
            });
        }
        notices
    }

    // --- Mattern initiator ---

    /// Announces a new cut to every peer. Acknowledgements arrive through
    /// [`Process::on_envelope`].
    pub fn begin_mattern(&mut self) -> KernelResult<Vec<Outbound>> {
        if self.reset_round.is_some() {
            return Err(KernelError::RunInProgress);
        }
        let now = self.clock.get(&self.id).unwrap_or(0);
        // The announcement and its acknowledgements tick twice per peer; all
        // of them must stay below the cut.
        let floor = 2 * self.peers.len() as u64 + 2;
        let interval = self.broadcast_interval.max(floor);
        let info = self
            .mattern
            .begin(self.id, now, interval, self.peers.clone())?;
        Ok(self.broadcast(Command::TakeSnapshot, Payload::FutureTick(info.future_tick)))
    }

    pub fn mattern_acks_complete(&self) -> bool {
        self.mattern.acks_complete()
    }

    /// After every acknowledgement: record the initiator's cut, move its own
    /// entry onto the cut and push one red message down every channel.
    pub fn complete_initiator_cut(&mut self) -> KernelResult<Vec<Outbound>> {
        let info = *self.mattern.info().ok_or(KernelError::NoActiveRun)?;
        if !self.mattern.acks_complete() {
            return Err(KernelError::RunInProgress);
        }
        self.record_initiator_cut();
        self.clock.advance_to(self.id, info.future_tick);
        Ok(self.broadcast(Command::Dummy, Payload::Empty))
    }

    fn record_initiator_cut(&mut self) {
        if self.mattern.local_recorded() {
            return;
        }
        let counter = match self.mattern.quorum() {
            Some(quorum) => self.counters.total_within(quorum),
            None => return,
        };
        let snapshot = self.ledger.snapshot(self.id);
        // Only fails without an active run, which the quorum lookup excluded.
        let _ = self.mattern.record_initiator_cut(snapshot, counter);
    }

    pub fn mattern_terminated(&self) -> bool {
        self.mattern.terminated()
    }

    /// Publishes a terminated run and returns to idle.
    pub fn finish_mattern(&mut self) -> Option<GlobalSnapshot> {
        self.mattern.finish()
    }

    pub fn abort_mattern(&mut self) {
        self.mattern.abort();
    }

    // --- Chandy-Lamport initiator ---

    /// Forces every peer back to `Idle` before a new marker run.
    pub fn begin_marker_reset(&mut self) -> KernelResult<Vec<Outbound>> {
        if self.reset_round.is_some()
            || self.marker.phase() == MarkerPhase::Recording
            || (self.mattern.is_active() && !self.mattern.acks_complete())
        {
            return Err(KernelError::RunInProgress);
        }
        self.marker.reset();
        self.reset_round = Some(AckRound::new(&self.peers));
        Ok(self.broadcast(Command::ChandyLamportReset, Payload::Empty))
    }

    pub fn marker_reset_complete(&self) -> bool {
        self.reset_round.as_ref().map_or(false, AckRound::is_complete)
    }

    pub fn abort_marker(&mut self) {
        self.reset_round = None;
        self.marker.reset();
    }

    /// Records local state and broadcasts the first markers.
    pub fn start_marker(&mut self) -> KernelResult<Effects> {
        match self.reset_round.as_ref() {
            Some(round) if !round.is_complete() => return Err(KernelError::RunInProgress),
            _ => {}
        }
        self.reset_round = None;
        self.tick();
        let local = self.ledger.snapshot(self.id);
        let peers = self.peers.clone();
        let outcome = self.marker.start(local, &peers)?;
        let mut fx = Effects::default();
        fx.notices.push(Notice::CutRecorded {
            algorithm: Algorithm::ChandyLamport,
        });
        self.apply_marker_outcome(outcome, &mut fx);
        Ok(fx)
    }

    fn apply_marker_outcome(&mut self, outcome: MarkerOutcome, fx: &mut Effects) {
        if let Some(reason) = outcome.violation {
            fx.notices.push(Notice::ProtocolViolation(reason));
        }
        if let Some(state) = outcome.broadcast {
            let markers = self.broadcast(Command::ChandyLamportMarker, Payload::Marker(state));
            fx.outbound.extend(markers);
        }
        if let Some(cut) = outcome.completed {
            fx.notices.push(Notice::Published(cut));
            self.marker.reset();
        }
    }

    // --- Receive pipeline ---

    pub fn on_envelope(&mut self, envelope: Envelope) -> KernelResult<Effects> {
        envelope.validate()?;
        let mut fx = Effects::default();
        let from = envelope.source_id;
        let handshake = envelope.command.is_handshake();

        if !handshake && !self.peers.contains(&from) {
            fx.notices.push(Notice::ProtocolViolation("envelope from an unregistered process"));
            return Ok(fx);
        }

        let mut intercept = self.mattern.classify(&self.clock, &envelope);
        let seen = envelope.vector_clock.get(&self.id).unwrap_or(0);
        if self.next_tick_reaches_cut(seen) {
            // This receive is the first event past the initiator's cut. The
            // cut is taken before the receive is counted, and the message,
            // sent before the cut, is in flight.
            self.record_initiator_cut();
            if !handshake && intercept == Intercept::Pass {
                intercept = Intercept::FoldWhite;
            }
        }
        let report = match intercept {
            Intercept::RecordCut => Some(self.record_participant_cut()),
            _ => None,
        };

        if !handshake {
            self.counters.received_from(from);
        }
        self.clock.merge(&envelope.vector_clock);
        self.tick();

        match intercept {
            Intercept::RecordCut => {
                if let Some((snapshot, counter)) = report {
                    self.report_cut(snapshot, counter, &mut fx);
                }
            }
            Intercept::FoldWhite => self.fold_or_forward(envelope.clone(), &mut fx),
            Intercept::Pass => {}
        }

        self.dispatch(envelope, &mut fx);
        Ok(fx)
    }

    /// Captures this process's cut before the red message is applied.
    fn record_participant_cut(&mut self) -> (Snapshot, i64) {
        let snapshot = self.ledger.snapshot(self.id);
        let counter = self.counters.total_within(&self.peers);
        (snapshot, counter)
    }

    fn report_cut(&mut self, snapshot: Snapshot, counter: i64, fx: &mut Effects) {
        fx.notices.push(Notice::CutRecorded {
            algorithm: Algorithm::Mattern,
        });
        let Some(info) = self.mattern.info().copied() else {
            return;
        };
        if info.initiator_id == self.id {
            self.record_initiator_cut();
            fx.notices.push(Notice::MatternProgress);
            return;
        }
        if !self.peers.contains(&info.initiator_id) {
            fx.notices.push(Notice::ProtocolViolation("no link to the snapshot initiator"));
            return;
        }
        let payload = Payload::Snapshot {
            snapshot,
            msg_counter: counter,
        };
        let out = self.send(info.initiator_id, Command::Snapshot, payload);
        fx.outbound.push(out);
    }

    fn fold_or_forward(&mut self, envelope: Envelope, fx: &mut Effects) {
        let Some(info) = self.mattern.info().copied() else {
            return;
        };
        if info.initiator_id == self.id {
            if self.mattern.fold_white(self.id, envelope) {
                fx.notices.push(Notice::MatternProgress);
            }
            return;
        }
        if !self.peers.contains(&info.initiator_id) {
            fx.notices.push(Notice::ProtocolViolation("no link to the snapshot initiator"));
            return;
        }
        let out = self.send(
            info.initiator_id,
            Command::WhiteMessage,
            Payload::WhiteMessage(Box::new(envelope)),
        );
        fx.outbound.push(out);
    }

    fn dispatch(&mut self, envelope: Envelope, fx: &mut Effects) {
        let from = envelope.source_id;
        match envelope.command {
            Command::Register => {
                if let Ok(accounts) = envelope.accounts() {
                    self.register_peer(from, accounts, fx);
                }
                let accounts = self.ledger.account_ids();
                let out = self.send(from, Command::RegisterResponse, Payload::Accounts(accounts));
                fx.outbound.push(out);
            }
            Command::RegisterResponse => {
                if let Ok(accounts) = envelope.accounts() {
                    self.register_peer(from, accounts, fx);
                }
            }
            Command::Deposit | Command::Withdraw => {
                if let Ok((account, amount)) = envelope.ledger_op() {
                    let applied = match envelope.command {
                        Command::Deposit => self.ledger.deposit(account, amount),
                        _ => self.ledger.withdraw(account, amount),
                    };
                    if let Err(e) = applied {
                        fx.notices.push(Notice::LedgerRejected(e));
                    }
                }
            }
            Command::GetBalance => {
                if let Ok(account) = envelope.balance_query() {
                    let payload = Payload::Balance {
                        account_id: account.clone(),
                        amount: self.ledger.balance(account).ok(),
                    };
                    let out = self.send(from, Command::GetBalanceResponse, payload);
                    fx.outbound.push(out);
                }
            }
            Command::GetBalanceResponse => {
                if let Ok((account, amount)) = envelope.balance_reply() {
                    fx.notices.push(Notice::BalanceReply {
                        from,
                        account: account.clone(),
                        amount,
                    });
                }
            }
            Command::TakeSnapshot => {
                if let Ok(future_tick) = envelope.future_tick() {
                    if self.mattern.is_active() {
                        // Two runs cannot share one colouring.
                        self.mattern.abort();
                        fx.notices.push(Notice::RunSuperseded { by: from });
                    }
                    self.mattern.install(InitiatorInfo {
                        initiator_id: from,
                        future_tick,
                    });
                    let out = self.send(from, Command::Acknowledgement, Payload::Empty);
                    fx.outbound.push(out);
                }
            }
            Command::Acknowledgement => {
                let counted = self.mattern.acknowledge(&from)
                    || self
                        .reset_round
                        .as_mut()
                        .map_or(false, |round| round.acknowledge(&from));
                if counted {
                    fx.notices.push(Notice::Acknowledged { from });
                } else {
                    fx.notices.push(Notice::ProtocolViolation("unexpected acknowledgement"));
                }
            }
            Command::Dummy => {}
            Command::Snapshot => {
                if let Ok((snapshot, counter)) = envelope.snapshot_report() {
                    if self.mattern.collect_snapshot(from, snapshot.clone(), counter) {
                        fx.notices.push(Notice::MatternProgress);
                    } else {
                        fx.notices.push(Notice::ProtocolViolation("snapshot report outside an active run"));
                    }
                }
            }
            Command::WhiteMessage => {
                if let Ok(inner) = envelope.white_message() {
                    if self.mattern.fold_white(from, inner.clone()) {
                        fx.notices.push(Notice::MatternProgress);
                    } else {
                        fx.notices.push(Notice::ProtocolViolation("white message outside an active run"));
                    }
                }
            }
            Command::ChandyLamportMarker => {
                if let Ok(carried) = envelope.marker() {
                    let peers = self.peers.clone();
                    let id = self.id;
                    let ledger = &self.ledger;
                    let outcome = self
                        .marker
                        .on_marker(from, carried.clone(), || ledger.snapshot(id), &peers);
                    if outcome.broadcast.is_some() {
                        fx.notices.push(Notice::CutRecorded {
                            algorithm: Algorithm::ChandyLamport,
                        });
                    }
                    self.apply_marker_outcome(outcome, fx);
                }
            }
            Command::ChandyLamportReset => {
                self.marker.reset();
                let out = self.send(from, Command::Acknowledgement, Payload::Empty);
                fx.outbound.push(out);
            }
        }
    }
}
