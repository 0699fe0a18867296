// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use ledgercut_cli::commands::run::{self, RunArgs};

#[derive(Parser)]
#[command(name = "ledgercut")]
#[command(about = "Bank process with Mattern and Chandy-Lamport global snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a bank process and read operator commands from stdin
    Run {
        /// JSON node config
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Address to accept peers on (overrides the config)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Peer to connect to at startup; repeatable
        #[arg(long)]
        connect: Vec<SocketAddr>,

        /// Account to open at startup; repeatable
        #[arg(long = "account")]
        accounts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bind,
            connect,
            accounts,
        } => {
            run::run(RunArgs {
                config,
                bind,
                connect,
                accounts,
            })
            .await
        }
    }
}
