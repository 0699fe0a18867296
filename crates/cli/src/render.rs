// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use ledgercut_kernel::snapshot::GlobalSnapshot;

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One row per recorded account, plus a summary row.
pub fn snapshot_table(cut: &GlobalSnapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Process", "Account", "Balance"]);

    for (owner, snapshot) in &cut.snapshots {
        if snapshot.accounts.is_empty() {
            table.add_row(vec![owner.to_string(), "-".to_string(), "-".to_string()]);
        }
        for account in &snapshot.accounts {
            table.add_row(vec![
                owner.to_string(),
                account.account_id.to_string(),
                account.balance.to_string(),
            ]);
        }
    }
    table.add_row(vec![
        format!("{} process(es)", cut.len()),
        format!("{} in flight", cut.white_messages.len()),
        format!("{} (+{})", cut.total_balance(), cut.in_flight()),
    ]);
    table
}

pub fn summary(cut: &GlobalSnapshot) -> String {
    format!(
        "{} snapshot by {}: conserved total {}, digest {}",
        cut.algorithm.label(),
        cut.initiator,
        cut.conserved_total(),
        hex(&cut.digest())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgercut_kernel::snapshot::{AccountSnapshot, Algorithm, Snapshot};
    use ledgercut_kernel::types::{AccountId, ProcessId};

    #[test]
    fn test_table_lists_every_account() {
        let owner = ProcessId(uuid_from(7));
        let mut cut = GlobalSnapshot::new(Algorithm::Mattern, owner);
        cut.snapshots.insert(
            owner,
            Snapshot {
                owner,
                accounts: vec![
                    AccountSnapshot { account_id: AccountId::from("alice"), balance: 10 },
                    AccountSnapshot { account_id: AccountId::from("bob"), balance: 32 },
                ],
            },
        );
        let rendered = snapshot_table(&cut).to_string();
        assert!(rendered.contains("alice"));
        assert!(rendered.contains("bob"));
        assert!(rendered.contains("42"));
        assert_eq!(hex(&[0x0a, 0xff]), "0aff");
    }

    fn uuid_from(n: u128) -> ledgercut_kernel::types::Uuid {
        ledgercut_kernel::types::Uuid::from_u128(n)
    }
}
