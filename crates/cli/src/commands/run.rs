// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! `ledgercut run`: host one bank process and drive it from stdin.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use ledgercut_kernel::config::INITIAL_BALANCE;
use ledgercut_kernel::snapshot::{Algorithm, GlobalSnapshot};
use ledgercut_node::config::NodeConfig;
use ledgercut_node::network::tcp;
use ledgercut_node::{telemetry, Bank};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::console::{self, ConsoleCommand, HELP};
use crate::render;

#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub bind: Option<SocketAddr>,
    pub connect: Vec<SocketAddr>,
    pub accounts: Vec<String>,
}

/// Config file (or defaults) with command-line overrides applied.
pub fn resolve_config(args: &RunArgs) -> anyhow::Result<NodeConfig> {
    let mut cfg = match &args.config {
        Some(path) => NodeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(bind) = args.bind {
        cfg.bind_addr = bind;
    }
    cfg.peers.extend(args.connect.iter().copied());
    cfg.accounts.extend(args.accounts.iter().cloned());
    Ok(cfg)
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    telemetry::init_telemetry();
    let cfg = resolve_config(&args)?;
    let bank = Bank::new(&cfg)?;
    println!("process {}", bank.id());

    let (addr, _accept) = tcp::listen(bank.clone(), cfg.bind_addr).await?;
    println!("listening on {}", addr);
    for peer in &cfg.peers {
        tcp::connect(&bank, *peer)
            .await
            .with_context(|| format!("connecting to {}", peer))?;
    }

    let mut published = bank.subscribe();
    let mut last: Option<GlobalSnapshot> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console::parse(&line) {
                    Ok(Some(ConsoleCommand::Exit)) => break,
                    Ok(Some(cmd)) => {
                        if let Err(e) = execute(&bank, cmd, &last).await {
                            println!("error: {:#}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("error: {:#}", e),
                }
            }
            cut = published.recv() => match cut {
                Ok(cut) => {
                    println!("{}", render::snapshot_table(&cut));
                    println!("{}", render::summary(&cut));
                    last = Some(cut);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} published snapshot(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    bank.shutdown().await;
    Ok(())
}

async fn execute(bank: &Bank, cmd: ConsoleCommand, last: &Option<GlobalSnapshot>) -> anyhow::Result<()> {
    match cmd {
        ConsoleCommand::Open { account, balance } => {
            bank.open_account(account, balance.unwrap_or(INITIAL_BALANCE)).await?;
        }
        ConsoleCommand::Deposit { account, amount } => bank.deposit(&account, amount).await?,
        ConsoleCommand::Withdraw { account, amount } => bank.withdraw(&account, amount).await?,
        ConsoleCommand::Transfer { from, to, amount } => bank.transfer(&from, &to, amount).await?,
        ConsoleCommand::Balance { account } => {
            let amount = bank.balance(&account).await?;
            println!("{}: {}", account, amount);
        }
        ConsoleCommand::Snapshot(Algorithm::Mattern) => {
            // Runs in the background; the result arrives on the subscription.
            let run = bank.start_mattern().await?;
            tokio::spawn(async move {
                if let Err(e) = run.wait().await {
                    println!("error: mattern run failed: {}", e);
                }
            });
        }
        ConsoleCommand::Snapshot(Algorithm::ChandyLamport) => bank.start_chandy_lamport().await?,
        ConsoleCommand::Last => match last {
            Some(cut) => println!("{}", serde_json::to_string_pretty(cut)?),
            None => println!("no snapshot published yet"),
        },
        ConsoleCommand::Peers => {
            for peer in bank.peers().await {
                println!("{}", peer);
            }
        }
        ConsoleCommand::Metrics => println!("{}", telemetry::render_metrics()),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Exit => {}
    }
    Ok(())
}
