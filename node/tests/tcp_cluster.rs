// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use ledgercut_kernel::types::AccountId;
use ledgercut_node::config::NodeConfig;
use ledgercut_node::network::tcp;
use ledgercut_node::Bank;
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(10);

fn bank(name: &str) -> Bank {
    Bank::new(&NodeConfig {
        accounts: vec![name.to_string()],
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_tcp_cluster_snapshots() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    let banks = vec![bank("north"), bank("south"), bank("east")];
    let mut addrs = Vec::new();
    for b in &banks {
        let (addr, _accept) = tcp::listen(b.clone(), "127.0.0.1:0".parse().unwrap()).await.unwrap();
        addrs.push(addr);
    }
    tcp::connect(&banks[0], addrs[1]).await.unwrap();
    tcp::connect(&banks[0], addrs[2]).await.unwrap();
    tcp::connect(&banks[1], addrs[2]).await.unwrap();
    for b in &banks {
        timeout(WAIT, b.wait_for_peers(2)).await.unwrap().unwrap();
    }

    banks[2]
        .transfer(&AccountId::from("east"), &AccountId::from("north"), 75)
        .await
        .unwrap();
    assert_eq!(
        timeout(WAIT, banks[1].balance(&AccountId::from("east"))).await.unwrap().unwrap(),
        425
    );

    let run = banks[1].start_mattern().await.unwrap();
    let cut = timeout(WAIT, run.wait()).await.unwrap().unwrap();
    assert_eq!(cut.len(), 3);
    assert_eq!(cut.conserved_total(), 1500);

    let mut sub = banks[0].subscribe();
    banks[0].start_chandy_lamport().await.unwrap();
    let marker_cut = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(marker_cut.len(), 3);
    assert_eq!(marker_cut.total_balance(), 1500);
}

#[tokio::test]
async fn test_tcp_disconnect_is_observed() {
    let a = bank("left");
    let b = bank("right");
    let (addr, _accept) = tcp::listen(b.clone(), "127.0.0.1:0".parse().unwrap()).await.unwrap();
    tcp::connect(&a, addr).await.unwrap();
    timeout(WAIT, a.wait_for_peers(1)).await.unwrap().unwrap();
    timeout(WAIT, b.wait_for_peers(1)).await.unwrap().unwrap();

    b.shutdown().await;
    timeout(WAIT, async {
        while !a.peers().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(a.balance(&AccountId::from("right")).await.is_err());
}
