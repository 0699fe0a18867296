// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::BTreeSet;

use crate::clock::VectorClock;
use crate::envelope::{Command, Envelope, Payload};
use crate::error::KernelError;
use crate::mattern::{InitiatorInfo, Intercept, MatternCoordinator};
use crate::process::Notice;
use crate::snapshot::Algorithm;
use crate::tests::sim::{account, pid, Network};

#[test]
fn test_quiet_bank_snapshot() {
    let mut net = Network::bank(3, 500);
    let cut = net.run_mattern(pid(1));

    assert_eq!(cut.algorithm, Algorithm::Mattern);
    assert_eq!(cut.initiator, pid(1));
    assert_eq!(cut.len(), 3);
    assert_eq!(cut.total_balance(), 1500);
    assert!(cut.white_messages.is_empty());
    for i in 1..=3 {
        assert_eq!(cut.snapshots[&pid(i)].balance_of(&account(i)), Some(500));
    }
    assert!(!net.proc(pid(1)).mattern().is_active());
}

#[test]
fn test_in_flight_transfer_is_conserved() {
    let (a, b, c) = (pid(1), pid(2), pid(3));
    let mut net = Network::bank(3, 500);

    // b -> c transfer whose deposit is still on the wire when the cut passes c.
    assert!(net.proc(b).withdraw(&account(2), 100).unwrap().is_none());
    let deposit = net.proc(b).deposit(&account(3), 100).unwrap().unwrap();
    net.enqueue(b, vec![deposit]);

    let announce = net.proc(a).begin_mattern().unwrap();
    net.enqueue(a, announce);
    net.step(a, b);
    net.step(a, c);
    net.step(b, a);
    net.step(c, a);
    assert!(net.proc(a).mattern_acks_complete());
    assert_eq!(net.pending(b, c), 1);

    let dummies = net.proc(a).complete_initiator_cut().unwrap();
    net.enqueue(a, dummies);
    net.step(a, c);
    net.step(b, c);
    assert_eq!(net.proc(c).ledger().balance(&account(3)).unwrap(), 600);

    net.drain(c, a);
    assert_eq!(net.proc(a).mattern().collected(), 2);
    assert!(!net.proc(a).mattern_terminated());

    net.deliver_all();
    assert!(net.proc(a).mattern_terminated());
    let cut = net.proc(a).finish_mattern().unwrap();

    assert_eq!(cut.snapshots[&b].balance_of(&account(2)), Some(400));
    assert_eq!(cut.snapshots[&c].balance_of(&account(3)), Some(500));
    assert_eq!(cut.white_messages.len(), 1);
    assert_eq!(cut.total_balance(), 1400);
    assert_eq!(cut.in_flight(), 100);
    assert_eq!(cut.conserved_total(), 1500);
}

#[test]
fn test_consecutive_runs_terminate() {
    let mut net = Network::bank(3, 500);
    let first = net.run_mattern(pid(1));

    let out = net.proc(pid(3)).deposit(&account(2), 5).unwrap().unwrap();
    net.enqueue(pid(3), vec![out]);
    net.deliver_all();

    let second = net.run_mattern(pid(2));
    assert_eq!(second.len(), 3);
    assert_eq!(second.total_balance(), first.total_balance() + 5);
    assert_ne!(first.digest(), second.digest());
}

#[test]
fn test_red_sends_after_the_cut() {
    let (a, b) = (pid(1), pid(2));
    let mut net = Network::bank(2, 500);
    let announce = net.proc(a).begin_mattern().unwrap();
    net.enqueue(a, announce);
    net.deliver_all();
    let dummies = net.proc(a).complete_initiator_cut().unwrap();
    net.enqueue(a, dummies);

    // Overtakes nothing: FIFO puts it behind the dummy.
    let out = net.proc(a).deposit(&account(2), 50).unwrap().unwrap();
    net.enqueue(a, vec![out]);
    net.deliver_all();

    let cut = net.proc(a).finish_mattern().unwrap();
    assert_eq!(cut.snapshots[&b].balance_of(&account(2)), Some(500));
    assert!(cut.white_messages.is_empty());
    assert_eq!(net.proc(b).ledger().balance(&account(2)).unwrap(), 550);
}

#[test]
fn test_initiator_cut_on_receive_during_ack_round() {
    let (a, b) = (pid(1), pid(2));
    let mut net = Network::bank(2, 500);
    let announce = net.proc(a).begin_mattern().unwrap();
    net.enqueue(a, announce);

    // More white receives than the interval, before b has even seen the
    // announcement.
    for _ in 0..120 {
        let out = net.proc(b).transfer(&account(2), &account(1), 1).unwrap();
        net.enqueue(b, out);
    }
    net.drain(b, a);
    assert!(net.proc(a).mattern().local_recorded());
    assert!(!net.proc(a).mattern_acks_complete());

    net.deliver_all();
    let dummies = net.proc(a).complete_initiator_cut().unwrap();
    net.enqueue(a, dummies);
    net.deliver_all();
    assert!(net.proc(a).mattern_terminated());
    let cut = net.proc(a).finish_mattern().unwrap();

    assert_eq!(cut.snapshots[&b].balance_of(&account(2)), Some(380));
    let recorded = cut.snapshots[&a].balance_of(&account(1)).unwrap();
    assert_eq!(cut.in_flight(), 620 - recorded);
    // The in-flight deposits plus b's acknowledgement.
    assert_eq!(cut.white_messages.len() as i64, cut.in_flight() + 1);
    assert_eq!(cut.conserved_total(), 1000);
    assert_eq!(net.proc(a).ledger().balance(&account(1)).unwrap(), 620);
}

#[test]
fn test_local_and_incoming_traffic_cross_the_cut_before_acks() {
    let (a, b, c) = (pid(1), pid(2), pid(3));
    let mut net = Network::bank(3, 500);
    let announce = net.proc(a).begin_mattern().unwrap();
    net.enqueue(a, announce);
    net.step(a, b);
    net.step(a, c);
    // c's acknowledgement stays on the wire.
    assert_eq!(net.pending(c, a), 1);

    for _ in 0..30 {
        let out = net.proc(a).transfer(&account(1), &account(3), 2).unwrap();
        net.enqueue(a, out);
    }
    assert!(!net.proc(a).mattern().local_recorded());
    for _ in 0..60 {
        let out = net.proc(b).transfer(&account(2), &account(1), 1).unwrap();
        net.enqueue(b, out);
    }
    net.drain(b, a);
    assert!(net.proc(a).mattern().local_recorded());
    assert!(!net.proc(a).mattern_acks_complete());

    net.deliver_all();
    assert!(net.proc(a).mattern_acks_complete());
    let dummies = net.proc(a).complete_initiator_cut().unwrap();
    net.enqueue(a, dummies);
    net.deliver_all();
    assert!(net.proc(a).mattern_terminated());
    let cut = net.proc(a).finish_mattern().unwrap();

    assert_eq!(cut.len(), 3);
    assert!(!cut.white_messages.is_empty());
    assert_eq!(cut.conserved_total(), 1500);
    let settled = net.run_mattern(b);
    assert_eq!(settled.total_balance(), 1500);
    assert!(settled.white_messages.is_empty());
}

#[test]
fn test_foreign_announcement_supersedes_own_run() {
    let (a, b, c) = (pid(1), pid(2), pid(3));
    let mut net = Network::bank(3, 500);
    let first = net.proc(a).begin_mattern().unwrap();
    let second = net.proc(c).begin_mattern().unwrap();
    net.enqueue(a, first);
    net.enqueue(c, second);
    net.step(c, a);

    assert!(!net.proc(a).mattern().is_active());
    assert_eq!(net.proc(a).mattern().info().map(|info| info.initiator_id), Some(c));
    assert!(net.notices[&a].contains(&Notice::RunSuperseded { by: c }));

    net.deliver_all();
    assert!(!net.proc(c).mattern().is_active());
    assert!(net.notices[&c].contains(&Notice::RunSuperseded { by: a }));

    // Nothing is left running; a fresh run goes through.
    let cut = net.run_mattern(b);
    assert_eq!(cut.len(), 3);
    assert_eq!(cut.conserved_total(), 1500);
}

#[test]
fn test_future_tick_saturates() {
    let mut coord = MatternCoordinator::new();
    let quorum: BTreeSet<_> = [pid(2)].into_iter().collect();
    let info = coord.begin(pid(1), u64::MAX - 3, 100, quorum).unwrap();
    assert_eq!(info.future_tick, u64::MAX);
}

#[test]
fn test_second_begin_is_rejected() {
    let mut net = Network::bank(2, 0);
    let _ = net.proc(pid(1)).begin_mattern().unwrap();
    assert_eq!(net.proc(pid(1)).begin_mattern(), Err(KernelError::RunInProgress));
}

#[test]
fn test_lost_participant_aborts_run() {
    let mut net = Network::bank(3, 500);
    let _ = net.proc(pid(1)).begin_mattern().unwrap();
    let notices = net.proc(pid(1)).peer_lost(&pid(3));

    assert_eq!(
        notices,
        vec![Notice::RunAborted { algorithm: Algorithm::Mattern, peer: pid(3) }]
    );
    assert!(!net.proc(pid(1)).mattern().is_active());
    assert!(net.proc(pid(1)).owner_of(&account(3)).is_none());
}

fn envelope_with(clock: VectorClock) -> Envelope {
    Envelope::new(Command::Dummy, pid(2), clock, Payload::Empty)
}

#[test]
fn test_missing_entry_is_white() {
    let initiator = pid(1);
    let mut coord = MatternCoordinator::new();
    coord.install(InitiatorInfo { initiator_id: initiator, future_tick: 100 });

    let mut red_local = VectorClock::new();
    red_local.set(initiator, 100);
    let msg = envelope_with(VectorClock::new());
    assert_eq!(msg.vector_clock.find_tick(&initiator), -1);

    assert_eq!(coord.classify(&red_local, &msg), Intercept::FoldWhite);
    assert_eq!(coord.classify(&VectorClock::new(), &msg), Intercept::Pass);
}

#[test]
fn test_classification_is_pure() {
    let initiator = pid(1);
    let mut coord = MatternCoordinator::new();
    coord.install(InitiatorInfo { initiator_id: initiator, future_tick: 10 });

    let mut red = VectorClock::new();
    red.set(initiator, 10);
    let mut white = VectorClock::new();
    white.set(initiator, 9);
    let msg = envelope_with(red.clone());

    let first = coord.classify(&white, &msg);
    assert_eq!(first, Intercept::RecordCut);
    assert_eq!(coord.classify(&white, &msg), first);
    assert_eq!(coord.classify(&red, &msg), Intercept::Pass);

    let handshake = Envelope::new(Command::Register, pid(2), red, Payload::Accounts(vec![]));
    assert_eq!(coord.classify(&white, &handshake), Intercept::Pass);
}

#[test]
fn test_reports_outside_quorum_are_ignored() {
    let mut coord = MatternCoordinator::new();
    let quorum: BTreeSet<_> = [pid(2)].into_iter().collect();
    coord.begin(pid(1), 0, 100, quorum).unwrap();

    let snap = crate::ledger::Ledger::new().snapshot(pid(3));
    assert!(!coord.collect_snapshot(pid(3), snap, 4));
    assert_eq!(coord.global_counter(), Some(0));
    assert!(coord.acknowledge(&pid(2)));
    assert!(!coord.acknowledge(&pid(2)));
}
