// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::clock::VectorClock;
use crate::envelope::{Command, Envelope, Payload};
use crate::error::KernelError;
use crate::process::{BalanceLookup, Notice, Process};
use crate::tests::sim::{account, pid, Network};

#[test]
fn test_registration_maps_remote_accounts() {
    let mut net = Network::bank(3, 500);
    let p = net.proc(pid(1));
    assert_eq!(p.peers().len(), 2);
    assert_eq!(p.owner_of(&account(1)), Some(pid(1)));
    assert_eq!(p.owner_of(&account(3)), Some(pid(3)));
    assert_eq!(p.owner_of(&account(9)), None);
    // Handshakes are outside the counters.
    assert_eq!(p.counters().total(), 0);
}

#[test]
fn test_remote_deposit_and_withdraw() {
    let mut net = Network::bank(2, 500);
    let dep = net.proc(pid(1)).deposit(&account(2), 70).unwrap().unwrap();
    assert_eq!(dep.to, pid(2));
    assert_eq!(dep.envelope.command, Command::Deposit);
    let wd = net.proc(pid(1)).withdraw(&account(2), 20).unwrap().unwrap();
    net.enqueue(pid(1), vec![dep, wd]);
    net.deliver_all();

    assert_eq!(net.proc(pid(2)).ledger().balance(&account(2)).unwrap(), 550);
    assert_eq!(net.proc(pid(1)).counters().channel(&pid(2)), 2);
    assert_eq!(net.proc(pid(2)).counters().channel(&pid(1)), -2);
}

#[test]
fn test_remote_balance_query() {
    let mut net = Network::bank(2, 500);
    let lookup = net.proc(pid(1)).balance(&account(2)).unwrap();
    let BalanceLookup::Remote(query) = lookup else {
        panic!("expected a remote lookup");
    };
    net.enqueue(pid(1), vec![query]);
    net.deliver_all();

    let replies = &net.notices[&pid(1)];
    assert!(replies.contains(&Notice::BalanceReply {
        from: pid(2),
        account: account(2),
        amount: Some(500),
    }));
    assert_eq!(net.proc(pid(1)).balance(&account(1)).unwrap(), BalanceLookup::Local(500));
}

#[test]
fn test_unknown_account_is_local_error() {
    let mut net = Network::bank(2, 500);
    assert_eq!(
        net.proc(pid(1)).deposit(&account(7), 1),
        Err(KernelError::UnknownAccount(account(7)))
    );
    assert_eq!(
        net.proc(pid(1)).withdraw(&account(1), -1),
        Err(KernelError::InvalidAmount(-1))
    );
}

#[test]
fn test_stale_routing_is_rejected_at_owner() {
    let mut net = Network::bank(2, 500);
    let mut clock = VectorClock::new();
    clock.tick(pid(1));
    let env = Envelope::new(
        Command::Deposit,
        pid(1),
        clock.clone(),
        Payload::LedgerOp { account_id: account(5), amount: 3 },
    );
    let fx = net.proc(pid(2)).on_envelope(env).unwrap();
    assert_eq!(fx.notices, vec![Notice::LedgerRejected(KernelError::UnknownAccount(account(5)))]);

    let query = Envelope::new(
        Command::GetBalance,
        pid(1),
        clock,
        Payload::BalanceQuery { account_id: account(5) },
    );
    let fx = net.proc(pid(2)).on_envelope(query).unwrap();
    assert_eq!(fx.outbound.len(), 1);
    assert_eq!(fx.outbound[0].envelope.balance_reply().unwrap(), (&account(5), None));
}

#[test]
fn test_unregistered_sender_is_ignored() {
    let mut lone = Process::new(pid(1));
    lone.open_account(account(1), 10).unwrap();
    let env = Envelope::new(
        Command::Deposit,
        pid(4),
        VectorClock::new(),
        Payload::LedgerOp { account_id: account(1), amount: 3 },
    );
    let fx = lone.on_envelope(env).unwrap();
    assert!(matches!(fx.notices[..], [Notice::ProtocolViolation(_)]));
    assert_eq!(lone.ledger().balance(&account(1)).unwrap(), 10);
    assert!(lone.clock().is_empty());
}

#[test]
fn test_receive_merges_then_ticks() {
    let mut net = Network::bank(2, 0);
    let before = net.proc(pid(1)).clock().get(&pid(1)).unwrap();
    let out = net.proc(pid(1)).deposit(&account(2), 1).unwrap().unwrap();
    let sent = out.envelope.vector_clock.clone();
    net.enqueue(pid(1), vec![out]);
    net.deliver_all();

    assert_eq!(sent.get(&pid(1)), Some(before + 1));
    let recv = net.proc(pid(2)).clock().clone();
    assert!(sent.happened_before(&recv));
    assert_eq!(recv.get(&pid(1)), Some(before + 1));
}

#[test]
fn test_transfer_resolves_both_accounts_first() {
    let mut net = Network::bank(2, 500);
    assert_eq!(
        net.proc(pid(1)).transfer(&account(1), &account(8), 10),
        Err(KernelError::UnknownAccount(account(8)))
    );
    assert_eq!(net.proc(pid(1)).ledger().balance(&account(1)).unwrap(), 500);

    let out = net.proc(pid(1)).transfer(&account(1), &account(2), 120).unwrap();
    assert_eq!(out.len(), 1);
    net.enqueue(pid(1), out);
    net.deliver_all();
    assert_eq!(net.proc(pid(1)).ledger().balance(&account(1)).unwrap(), 380);
    assert_eq!(net.proc(pid(2)).ledger().balance(&account(2)).unwrap(), 620);
}
