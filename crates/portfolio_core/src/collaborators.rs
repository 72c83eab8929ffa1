//! Interfaces to collaborators outside the accounting core
//!
//! The portfolio never moves tokens itself and never decides whether a lender
//! may deposit. It calls through these traits, and surfaces their failures as
//! `TransferFailed` and `ControllerRejected`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::{Address, Status};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: u128, requested: u128 },

    #[error("insufficient allowance: {allowed} allowed, {requested} requested")]
    InsufficientAllowance { allowed: u128, requested: u128 },

    #[error("balance overflow")]
    Overflow,
}

/// Fungible asset ledger
pub trait AssetLedger {
    /// Move `amount` from `from` to `to`, on `from`'s authority
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TransferError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    fn balance_of(&self, account: &Address) -> u128;
}

/// Optional notification on the receiving side of a portfolio transfer
pub trait TransferHook {
    fn on_transfer(&mut self, amount: u128) -> Result<(), String>;
}

/// What a controller sees about the tranche being acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    pub status: Status,
    pub tranche: usize,
    /// Effective value of the tranche before the operation
    pub tranche_value: u128,
}

pub trait DepositController {
    fn on_deposit(&self, ctx: &OperationContext, sender: &Address, amount: u128) -> Result<(), String>;
}

pub trait WithdrawController {
    fn on_withdraw(&self, ctx: &OperationContext, receiver: &Address, amount: u128) -> Result<(), String>;
}

pub trait TransferController {
    fn on_transfer(&self, status: Status, recipient: &Address, amount: u128) -> Result<(), String>;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl DepositController for AllowAll {
    fn on_deposit(&self, _ctx: &OperationContext, _sender: &Address, _amount: u128) -> Result<(), String> {
        Ok(())
    }
}

impl WithdrawController for AllowAll {
    fn on_withdraw(&self, _ctx: &OperationContext, _receiver: &Address, _amount: u128) -> Result<(), String> {
        Ok(())
    }
}

impl TransferController for AllowAll {
    fn on_transfer(&self, _status: Status, _recipient: &Address, _amount: u128) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects everything with a fixed reason
#[derive(Debug, Clone, Default)]
pub struct DenyAll {
    pub reason: String,
}

impl DepositController for DenyAll {
    fn on_deposit(&self, _ctx: &OperationContext, _sender: &Address, _amount: u128) -> Result<(), String> {
        Err(self.reason.clone())
    }
}

impl WithdrawController for DenyAll {
    fn on_withdraw(&self, _ctx: &OperationContext, _receiver: &Address, _amount: u128) -> Result<(), String> {
        Err(self.reason.clone())
    }
}

impl TransferController for DenyAll {
    fn on_transfer(&self, _status: Status, _recipient: &Address, _amount: u128) -> Result<(), String> {
        Err(self.reason.clone())
    }
}

/// Caps a tranche's value; deposits are only taken before close
#[derive(Debug, Clone, Copy)]
pub struct DepositCeiling {
    pub ceiling: u128,
}

impl DepositController for DepositCeiling {
    fn on_deposit(&self, ctx: &OperationContext, _sender: &Address, amount: u128) -> Result<(), String> {
        if ctx.status == Status::Closed {
            return Err("deposits are closed".to_string());
        }
        match ctx.tranche_value.checked_add(amount) {
            Some(value) if value <= self.ceiling => Ok(()),
            _ => Err(format!("deposit would exceed the ceiling of {}", self.ceiling)),
        }
    }
}

/// In-memory ledger used by tests and the simulator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLedger {
    balances: BTreeMap<Address, u128>,
    allowances: BTreeMap<(Address, Address), u128>,
}

impl InMemoryLedger {
    pub fn mint(&mut self, account: Address, amount: u128) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: u128) {
        self.allowances.insert((owner, spender), amount);
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TransferError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientBalance { available, requested: amount });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.balances.insert(*from, available - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl AssetLedger for InMemoryLedger {
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TransferError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance { allowed, requested: amount });
        }
        self.move_balance(from, to, amount)?;
        self.allowances.insert((*from, *spender), allowed - amount);
        Ok(())
    }

    fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = Address::from_seed(1);
    const BOB: Address = Address::from_seed(2);

    #[test]
    fn test_ledger_transfer() {
        let mut ledger = InMemoryLedger::default();
        ledger.mint(ALICE, 100);

        ledger.transfer(&ALICE, &BOB, 40).unwrap();
        assert_eq!(ledger.balance_of(&ALICE), 60);
        assert_eq!(ledger.balance_of(&BOB), 40);

        let err = ledger.transfer(&ALICE, &BOB, 61).unwrap_err();
        assert_eq!(err, TransferError::InsufficientBalance { available: 60, requested: 61 });
        assert_eq!(ledger.balance_of(&ALICE), 60);
    }

    #[test]
    fn test_ledger_transfer_from_spends_allowance() {
        let mut ledger = InMemoryLedger::default();
        ledger.mint(ALICE, 100);
        ledger.approve(ALICE, BOB, 50);

        ledger.transfer_from(&BOB, &ALICE, &BOB, 30).unwrap();
        assert_eq!(ledger.allowance(&ALICE, &BOB), 20);

        let err = ledger.transfer_from(&BOB, &ALICE, &BOB, 30).unwrap_err();
        assert_eq!(err, TransferError::InsufficientAllowance { allowed: 20, requested: 30 });
    }

    #[test]
    fn test_deposit_ceiling() {
        let controller = DepositCeiling { ceiling: 1_000 };
        let ctx = OperationContext { status: Status::Live, tranche: 1, tranche_value: 900 };

        assert!(controller.on_deposit(&ctx, &ALICE, 100).is_ok());
        assert!(controller.on_deposit(&ctx, &ALICE, 101).is_err());

        let closed = OperationContext { status: Status::Closed, ..ctx };
        assert_eq!(controller.on_deposit(&closed, &ALICE, 1), Err("deposits are closed".to_string()));
    }
}
