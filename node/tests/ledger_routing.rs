// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use ledgercut_kernel::error::KernelError;
use ledgercut_kernel::types::AccountId;
use ledgercut_node::config::NodeConfig;
use ledgercut_node::errors::NodeError;
use ledgercut_node::network::memory;
use ledgercut_node::Bank;
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(5);

async fn pair() -> (Bank, Bank) {
    let a = Bank::new(&NodeConfig {
        accounts: vec!["alice".into()],
        ..Default::default()
    })
    .unwrap();
    let b = Bank::new(&NodeConfig {
        accounts: vec!["bob".into(), "carol".into()],
        initial_balance: 100,
        ..Default::default()
    })
    .unwrap();
    memory::connect(&a, &b);
    timeout(WAIT, a.wait_for_peers(1)).await.unwrap().unwrap();
    timeout(WAIT, b.wait_for_peers(1)).await.unwrap().unwrap();
    (a, b)
}

#[tokio::test]
async fn test_remote_operations_route_to_owner() {
    let (a, b) = pair().await;
    let bob = AccountId::from("bob");

    a.deposit(&bob, 25).await.unwrap();
    a.withdraw(&bob, 5).await.unwrap();
    // Same FIFO link: the query is answered after both updates.
    assert_eq!(timeout(WAIT, a.balance(&bob)).await.unwrap().unwrap(), 120);
    assert_eq!(b.balance(&bob).await.unwrap(), 120);
    assert_eq!(a.balance(&AccountId::from("alice")).await.unwrap(), 500);
}

#[tokio::test]
async fn test_transfer_and_unknown_accounts() {
    let (a, b) = pair().await;
    let alice = AccountId::from("alice");
    let carol = AccountId::from("carol");

    a.transfer(&alice, &carol, 60).await.unwrap();
    assert_eq!(a.balance(&alice).await.unwrap(), 440);
    assert_eq!(timeout(WAIT, a.balance(&carol)).await.unwrap().unwrap(), 160);

    let ghost = AccountId::from("ghost");
    assert!(matches!(
        a.deposit(&ghost, 1).await,
        Err(NodeError::Kernel(KernelError::UnknownAccount(_)))
    ));
    assert!(matches!(
        b.transfer(&carol, &ghost, 1).await,
        Err(NodeError::Kernel(KernelError::UnknownAccount(_)))
    ));
    assert_eq!(b.balance(&carol).await.unwrap(), 160);
}

#[tokio::test]
async fn test_late_account_is_local_only() {
    let (a, b) = pair().await;
    let dave = AccountId::from("dave");
    b.open_account(dave.clone(), 10).await.unwrap();

    // Registration already happened; a does not know the new account.
    assert!(a.balance(&dave).await.is_err());
    assert!(matches!(
        b.open_account(dave, 0).await,
        Err(NodeError::Kernel(KernelError::DuplicateAccount(_)))
    ));
    assert_eq!(b.accounts().await.len(), 3);
}
