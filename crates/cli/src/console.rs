// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Operator console grammar.

use anyhow::{anyhow, bail, Context};
use ledgercut_kernel::snapshot::Algorithm;
use ledgercut_kernel::types::AccountId;

pub const HELP: &str = "\
commands:
  open ID [BALANCE]
  deposit ID AMOUNT
  withdraw ID AMOUNT
  transfer FROM TO AMOUNT
  balance ID
  snapshot mattern | snapshot chandy-lamport
  last        print the last published snapshot as JSON
  peers
  metrics
  help
  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open { account: AccountId, balance: Option<i64> },
    Deposit { account: AccountId, amount: i64 },
    Withdraw { account: AccountId, amount: i64 },
    Transfer { from: AccountId, to: AccountId, amount: i64 },
    Balance { account: AccountId },
    Snapshot(Algorithm),
    Last,
    Peers,
    Metrics,
    Help,
    Exit,
}

fn amount(token: &str) -> anyhow::Result<i64> {
    let value: i64 = token.parse().with_context(|| format!("invalid amount '{}'", token))?;
    if value < 0 {
        bail!("amount must not be negative");
    }
    Ok(value)
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = tokens.split_first() else {
        return Ok(None);
    };
    let cmd = match (head.to_ascii_lowercase().as_str(), args) {
        ("open", [id]) => ConsoleCommand::Open { account: AccountId::from(*id), balance: None },
        ("open", [id, balance]) => ConsoleCommand::Open {
            account: AccountId::from(*id),
            balance: Some(balance.parse().with_context(|| format!("invalid balance '{}'", balance))?),
        },
        ("deposit", [id, value]) => ConsoleCommand::Deposit { account: AccountId::from(*id), amount: amount(value)? },
        ("withdraw", [id, value]) => ConsoleCommand::Withdraw { account: AccountId::from(*id), amount: amount(value)? },
        ("transfer", [from, to, value]) => ConsoleCommand::Transfer {
            from: AccountId::from(*from),
            to: AccountId::from(*to),
            amount: amount(value)?,
        },
        ("balance", [id]) => ConsoleCommand::Balance { account: AccountId::from(*id) },
        ("snapshot", [kind]) => match kind.to_ascii_lowercase().as_str() {
            "mattern" => ConsoleCommand::Snapshot(Algorithm::Mattern),
            "chandy-lamport" | "cl" => ConsoleCommand::Snapshot(Algorithm::ChandyLamport),
            other => bail!("unknown snapshot algorithm '{}'", other),
        },
        ("last", []) => ConsoleCommand::Last,
        ("peers", []) => ConsoleCommand::Peers,
        ("metrics", []) => ConsoleCommand::Metrics,
        ("help", []) => ConsoleCommand::Help,
        ("exit" | "quit", []) => ConsoleCommand::Exit,
        (other, _) => return Err(anyhow!("unrecognised command '{}' (try 'help')", other)),
    };
    Ok(Some(cmd))
}
