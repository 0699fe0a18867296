// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Local account balances of one process.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};
use crate::snapshot::{AccountSnapshot, Snapshot};
use crate::types::{AccountId, ProcessId};

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    accounts: BTreeMap<AccountId, i64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, account: AccountId, balance: i64) -> KernelResult<()> {
        if self.accounts.contains_key(&account) {
            return Err(KernelError::DuplicateAccount(account));
        }
        self.accounts.insert(account, balance);
        Ok(())
    }

    pub fn contains(&self, account: &AccountId) -> bool {
        self.accounts.contains_key(account)
    }

    pub fn deposit(&mut self, account: &AccountId, amount: i64) -> KernelResult<i64> {
        let balance = self
            .accounts
            .get_mut(account)
            .ok_or_else(|| KernelError::UnknownAccount(account.clone()))?;
        *balance = balance.checked_add(amount).ok_or(KernelError::Overflow)?;
        Ok(*balance)
    }

    /// Balances may go negative; there is no overdraft policy.
    pub fn withdraw(&mut self, account: &AccountId, amount: i64) -> KernelResult<i64> {
        let balance = self
            .accounts
            .get_mut(account)
            .ok_or_else(|| KernelError::UnknownAccount(account.clone()))?;
        *balance = balance.checked_sub(amount).ok_or(KernelError::Overflow)?;
        Ok(*balance)
    }

    pub fn balance(&self, account: &AccountId) -> KernelResult<i64> {
        self.accounts
            .get(account)
            .copied()
            .ok_or_else(|| KernelError::UnknownAccount(account.clone()))
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.keys().cloned().collect()
    }

    /// Point-in-time copy of every account; never aliases live balances.
    pub fn snapshot(&self, owner: ProcessId) -> Snapshot {
        let accounts = self
            .accounts
            .iter()
            .map(|(id, balance)| AccountSnapshot {
                account_id: id.clone(),
                balance: *balance,
            })
            .collect();
        Snapshot { owner, accounts }
    }
}
