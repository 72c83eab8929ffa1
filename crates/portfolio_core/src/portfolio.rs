//! Portfolio lifecycle, checkpoint orchestration and balance mutators
//!
//! Every public mutator runs against a draft copy of the portfolio and only
//! commits it when the whole operation succeeds, so callers never observe a
//! partially updated checkpoint, balance or event log. Token movements are
//! issued last inside the draft, after every check has passed.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::access::AccessControl;
use crate::checkpoint::Checkpoint;
use crate::collaborators::{
    AssetLedger, DepositController, OperationContext, TransferController, TransferError,
    TransferHook, WithdrawController,
};
use crate::error::{PortfolioError, Result};
use crate::events::{Event, EventLog};
use crate::fees::FeeRateSource;
use crate::math::{checked_add_u128, checked_sub_u128, min, saturating_sub};
use crate::tranche::{Tranche, TrancheParams};
use crate::types::{Address, Role, Status};
use crate::upgrade::Implementation;
use crate::vaults::VaultsRegistry;
use crate::waterfall;

/// External collaborators consulted by operations that move assets
pub struct Collaborators<'a> {
    pub fees: &'a dyn FeeRateSource,
    pub vaults: &'a VaultsRegistry,
    pub token: &'a mut dyn AssetLedger,
}

/// Construction parameters, fixed for the life of the portfolio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioParams {
    pub name: String,
    /// Underlying asset
    pub asset: Address,
    /// Seconds between start and the nominal end date
    pub duration: u64,
    /// Seconds after creation during which the portfolio may start
    pub capital_formation_period: u64,
    /// Virtual token balance required to start
    pub minimum_size: u128,
    /// Equity first, most senior last
    pub tranches: Vec<TrancheParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub(crate) address: Address,
    pub(crate) asset: Address,
    pub(crate) manager: Address,
    pub(crate) name: String,
    pub(crate) status: Status,
    pub(crate) created_at: u64,
    pub(crate) start_deadline: u64,
    pub(crate) start_date: u64,
    pub(crate) end_date: u64,
    pub(crate) duration: u64,
    pub(crate) capital_formation_period: u64,
    pub(crate) minimum_size: u128,
    pub(crate) virtual_token_balance: u128,
    pub(crate) tranches: Vec<Tranche>,
    pub(crate) access: AccessControl,
    pub(crate) events: EventLog,
    // Appended by storage layout V2
    pub(crate) receivables: u128,
    pub(crate) implementation: Implementation,
}

// ============================================================================
// Construction
// ============================================================================

impl Portfolio {
    /// Create a portfolio in capital formation
    ///
    /// `admin` receives the Admin and Pauser roles, `manager` the Manager role.
    /// The manager address is also the key for protocol fee resolution.
    pub fn new(
        address: Address,
        admin: Address,
        manager: Address,
        params: PortfolioParams,
        now: u64,
        fees: &dyn FeeRateSource,
    ) -> Result<Self> {
        validate_params(&address, &params)?;

        let start_deadline = now
            .checked_add(params.capital_formation_period)
            .ok_or(PortfolioError::ArithmeticOverflow)?;
        let fee_rate = fees.effective_fee_rate(&manager);
        let tranches = params
            .tranches
            .into_iter()
            .map(|tranche| Tranche::new(tranche, fee_rate))
            .collect();

        let mut access = AccessControl::new(admin);
        access.insert(Role::Pauser, admin);
        access.insert(Role::Manager, manager);

        info!("portfolio {} created at {}", params.name, now);

        Ok(Self {
            address,
            asset: params.asset,
            manager,
            name: params.name,
            status: Status::CapitalFormation,
            created_at: now,
            start_deadline,
            start_date: 0,
            end_date: 0,
            duration: params.duration,
            capital_formation_period: params.capital_formation_period,
            minimum_size: params.minimum_size,
            virtual_token_balance: 0,
            tranches,
            access,
            events: EventLog::default(),
            receivables: 0,
            implementation: Implementation::current(),
        })
    }
}

fn validate_params(address: &Address, params: &PortfolioParams) -> Result<()> {
    let equity = params
        .tranches
        .first()
        .ok_or(PortfolioError::InvalidParams("portfolio needs at least one tranche"))?;
    if equity.min_subordinate_ratio != 0 {
        return Err(PortfolioError::InvalidParams("equity tranche cannot require subordination"));
    }
    if params.duration == 0 {
        return Err(PortfolioError::InvalidParams("duration must be positive"));
    }
    for (i, tranche) in params.tranches.iter().enumerate() {
        let duplicate = params.tranches[..i].iter().any(|t| t.address == tranche.address);
        if duplicate || tranche.address == *address {
            return Err(PortfolioError::InvalidParams("tranche addresses must be unique"));
        }
    }
    Ok(())
}

// ============================================================================
// Views
// ============================================================================

impl Portfolio {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn asset(&self) -> Address {
        self.asset
    }

    pub fn manager(&self) -> Address {
        self.manager
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn start_date(&self) -> u64 {
        self.start_date
    }

    pub fn end_date(&self) -> u64 {
        self.end_date
    }

    pub fn start_deadline(&self) -> u64 {
        self.start_deadline
    }

    pub fn minimum_size(&self) -> u128 {
        self.minimum_size
    }

    pub fn virtual_token_balance(&self) -> u128 {
        self.virtual_token_balance
    }

    pub fn receivables(&self) -> u128 {
        self.receivables
    }

    pub fn tranches(&self) -> &[Tranche] {
        &self.tranches
    }

    pub fn tranche(&self, index: usize) -> Option<&Tranche> {
        self.tranches.get(index)
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.tranches.iter().map(|t| t.checkpoint).collect()
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Take the pending events, leaving the log empty
    ///
    /// The log is part of the persisted state and grows with every
    /// operation until drained, so long-running callers should drain it
    /// after each operation.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    /// Index of the tranche whose identity is `caller`
    pub fn tranche_index(&self, caller: &Address) -> Result<usize> {
        self.tranches
            .iter()
            .position(|t| t.address == *caller)
            .ok_or(PortfolioError::NotATranche)
    }

    /// `min(now, end_date)` once started; the clock every accrual reads
    pub fn limited_block_timestamp(&self, now: u64) -> u64 {
        match self.status {
            Status::CapitalFormation => now,
            Status::Live | Status::Closed => min(now, self.end_date),
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl Portfolio {
    /// Leave capital formation and take the first checkpoint of every tranche
    pub fn start(&mut self, caller: &Address, now: u64, fees: &dyn FeeRateSource) -> Result<()> {
        self.transact(|p| {
            p.access.require_role(Role::Manager, caller)?;
            if p.status != Status::CapitalFormation {
                return Err(PortfolioError::InvalidState);
            }
            if now > p.start_deadline {
                return Err(PortfolioError::StartDeadlinePassed);
            }
            if p.virtual_token_balance < p.minimum_size {
                return Err(PortfolioError::BelowMinimumSize);
            }
            waterfall::check_subordination(&p.tranches, 0..p.tranches.len())?;

            p.start_date = now;
            p.end_date = now
                .checked_add(p.duration)
                .ok_or(PortfolioError::ArithmeticOverflow)?;
            for tranche in p.tranches.iter_mut() {
                tranche.checkpoint.timestamp = now;
            }
            p.status = Status::Live;
            p.checkpoint_all(now, fees)?;

            info!(
                "portfolio {} live at {} until {} with {} assets",
                p.name, p.start_date, p.end_date, p.virtual_token_balance
            );
            p.events.emit(Event::StatusChanged { status: Status::Live });
            Ok(())
        })
    }

    /// Final checkpoint, snapshot closing values and move to Closed
    ///
    /// The manager may close at any time. Anyone may close a portfolio that
    /// missed its start deadline or has reached its end date. Closing early
    /// pulls the end date back so nothing accrues afterwards.
    pub fn close(&mut self, caller: &Address, now: u64, fees: &dyn FeeRateSource) -> Result<()> {
        self.transact(|p| {
            p.access.require_not_paused()?;
            let is_manager = p.access.has_role(Role::Manager, caller);
            match p.status {
                Status::Closed => return Err(PortfolioError::InvalidState),
                Status::CapitalFormation if !is_manager && now <= p.start_deadline => {
                    return Err(PortfolioError::Unauthorized)
                }
                Status::Live if !is_manager && now < p.end_date => {
                    return Err(PortfolioError::Unauthorized)
                }
                _ => {}
            }

            if p.status == Status::Live {
                p.checkpoint_all(now, fees)?;
                if now < p.end_date {
                    p.end_date = now;
                }
            } else {
                p.end_date = now;
                for tranche in p.tranches.iter_mut() {
                    tranche.checkpoint.timestamp = now;
                }
            }

            for tranche in p.tranches.iter_mut() {
                tranche.max_value_on_close = tranche.effective_value();
            }
            p.status = Status::Closed;

            info!("portfolio {} closed at {}", p.name, now);
            p.events.emit(Event::StatusChanged { status: Status::Closed });
            Ok(())
        })
    }
}

// ============================================================================
// Checkpoints
// ============================================================================

impl Portfolio {
    /// Accrue a single tranche up to `now` without re-running the waterfall
    pub fn update_checkpoint(&mut self, index: usize, now: u64, fees: &dyn FeeRateSource) -> Result<Checkpoint> {
        self.transact(|p| {
            p.require_started()?;
            let limited = p.limited_block_timestamp(now);
            let fee_rate = fees.effective_fee_rate(&p.manager);
            let tranche = p.tranches.get_mut(index).ok_or(PortfolioError::NotATranche)?;
            tranche.checkpoint = tranche.checkpoint.accrue(tranche.target_apy, limited, fee_rate)?;
            let checkpoint = tranche.checkpoint;
            p.emit_checkpoint(index);
            Ok(checkpoint)
        })
    }

    /// Accrue every tranche up to `now` and re-run the loss waterfall
    pub fn update_checkpoints(&mut self, now: u64, fees: &dyn FeeRateSource) -> Result<Vec<Checkpoint>> {
        self.transact(|p| {
            p.checkpoint_all(now, fees)?;
            Ok(p.checkpoints())
        })
    }

    fn checkpoint_all(&mut self, now: u64, fees: &dyn FeeRateSource) -> Result<waterfall::Allocation> {
        self.require_started()?;
        let limited = self.limited_block_timestamp(now);
        let fee_rate = fees.effective_fee_rate(&self.manager);

        for tranche in self.tranches.iter_mut().rev() {
            tranche.checkpoint = tranche.checkpoint.accrue(tranche.target_apy, limited, fee_rate)?;
        }

        let allocation = self.reallocate()?;
        for index in 0..self.tranches.len() {
            self.emit_checkpoint(index);
        }
        Ok(allocation)
    }

    /// Re-run the waterfall against the current balance and receivables
    fn reallocate(&mut self) -> Result<waterfall::Allocation> {
        let backing = checked_add_u128(self.virtual_token_balance, self.receivables)?;
        let allocation = waterfall::allocate(&mut self.tranches, backing)?;
        debug!(
            "waterfall: backing {} fees {} surplus {} deficit {}",
            backing,
            allocation.total_backed_fees(),
            allocation.surplus,
            allocation.total_deficit
        );
        Ok(allocation)
    }

    /// Accrue and re-run the waterfall once the portfolio has started
    fn bring_current(&mut self, now: u64, fees: &dyn FeeRateSource) -> Result<()> {
        if self.status != Status::CapitalFormation {
            self.checkpoint_all(now, fees)?;
        }
        Ok(())
    }

    fn require_started(&self) -> Result<()> {
        if self.status == Status::CapitalFormation {
            return Err(PortfolioError::NotStarted);
        }
        Ok(())
    }

    fn emit_checkpoint(&mut self, index: usize) {
        let checkpoint = self.tranches[index].checkpoint;
        self.events.emit(Event::CheckpointUpdated {
            tranche: index,
            timestamp: checkpoint.timestamp,
            total_assets: checkpoint.total_assets,
            unpaid_fees: checkpoint.unpaid_fees,
            deficit: checkpoint.deficit,
        });
    }

    /// Run `op` on a draft and commit it only on success
    ///
    /// Pending events stay out of the draft; the ones `op` emits are
    /// appended on commit.
    fn transact<T>(&mut self, op: impl FnOnce(&mut Portfolio) -> Result<T>) -> Result<T> {
        let mut pending = core::mem::take(&mut self.events);
        let mut draft = self.clone();
        match op(&mut draft) {
            Ok(value) => {
                pending.append(&mut draft.events);
                draft.events = pending;
                *self = draft;
                Ok(value)
            }
            Err(err) => {
                self.events = pending;
                Err(err)
            }
        }
    }
}

// ============================================================================
// Tranche balance mutators
// ============================================================================

impl Portfolio {
    /// Credit `amount` to the calling tranche and the pool balance
    pub fn increase_virtual_token_balance(
        &mut self,
        caller: &Address,
        amount: u128,
        now: u64,
        fees: &dyn FeeRateSource,
    ) -> Result<()> {
        self.transact(|p| p.credit_tranche(caller, amount, now, fees).map(|_| ()))
    }

    /// Release `amount` of the calling tranche's value from the pool balance
    ///
    /// Fails with `ArithmeticUnderflow` when the pool balance is short; the
    /// balance is never clamped.
    pub fn decrease_virtual_token_balance(
        &mut self,
        caller: &Address,
        amount: u128,
        now: u64,
        fees: &dyn FeeRateSource,
    ) -> Result<()> {
        self.transact(|p| p.debit_tranche(caller, amount, now, fees).map(|_| ()))
    }

    fn credit_tranche(&mut self, caller: &Address, amount: u128, now: u64, fees: &dyn FeeRateSource) -> Result<usize> {
        let index = self.tranche_index(caller)?;
        if self.status == Status::Closed {
            return Err(PortfolioError::InvalidState);
        }
        self.bring_current(now, fees)?;
        self.apply_credit(index, amount)?;
        Ok(index)
    }

    fn debit_tranche(&mut self, caller: &Address, amount: u128, now: u64, fees: &dyn FeeRateSource) -> Result<usize> {
        let index = self.tranche_index(caller)?;
        self.bring_current(now, fees)?;
        self.apply_debit(index, amount)?;
        Ok(index)
    }

    /// Add `amount` to tranche `index` and the pool balance of an
    /// up-to-date portfolio
    fn apply_credit(&mut self, index: usize, amount: u128) -> Result<()> {
        if self.status == Status::Closed {
            return Err(PortfolioError::InvalidState);
        }
        self.virtual_token_balance = checked_add_u128(self.virtual_token_balance, amount)?;
        let checkpoint = &mut self.tranches[index].checkpoint;
        checkpoint.total_assets = checked_add_u128(checkpoint.total_assets, amount)?;

        if self.status != Status::CapitalFormation {
            // New backing repays senior deficits before the credited tranche
            self.reallocate()?;
        }
        if self.status == Status::Live {
            // Only the credited tranche's own ratio can get worse
            waterfall::check_subordination(&self.tranches, [index])?;
        }
        debug!("tranche {} credited {}, pool balance {}", index, amount, self.virtual_token_balance);
        Ok(())
    }

    /// Release `amount` of tranche `index` from the pool balance of an
    /// up-to-date portfolio
    fn apply_debit(&mut self, index: usize, amount: u128) -> Result<()> {
        let balance = checked_sub_u128(self.virtual_token_balance, amount)?;
        let tranche = &mut self.tranches[index];
        if amount > tranche.effective_value() {
            return Err(PortfolioError::ExceedsTrancheValue);
        }
        tranche.checkpoint.total_assets = checked_sub_u128(tranche.checkpoint.total_assets, amount)?;
        tranche.distributed_assets = checked_add_u128(tranche.distributed_assets, amount)?;
        self.virtual_token_balance = balance;

        if self.status != Status::CapitalFormation {
            self.reallocate()?;
        }
        if self.status == Status::Live {
            // Less junior value can only hurt the tranches above
            waterfall::check_subordination(&self.tranches, index + 1..self.tranches.len())?;
        }
        debug!("tranche {} debited {}, pool balance {}", index, amount, self.virtual_token_balance);
        Ok(())
    }
}

// ============================================================================
// Asset flows
// ============================================================================

impl Portfolio {
    /// Lender deposit into tranche `index`, authorized by its controller
    pub fn deposit(
        &mut self,
        index: usize,
        lender: &Address,
        amount: u128,
        now: u64,
        env: &mut Collaborators<'_>,
        controller: &dyn DepositController,
    ) -> Result<()> {
        self.transact(|p| {
            p.access.require_not_paused()?;
            if amount == 0 {
                return Err(PortfolioError::InvalidParams("amount must be positive"));
            }
            if p.status == Status::Closed {
                return Err(PortfolioError::InvalidState);
            }
            p.bring_current(now, env.fees)?;
            let ctx = p.operation_context(index)?;
            controller
                .on_deposit(&ctx, lender, amount)
                .map_err(PortfolioError::ControllerRejected)?;

            p.apply_credit(index, amount)?;
            env.token
                .transfer_from(&p.address, lender, &p.address, amount)
                .map_err(transfer_failed)?;
            Ok(())
        })
    }

    /// Pay `amount` of tranche `index` out to `receiver`
    pub fn withdraw(
        &mut self,
        index: usize,
        receiver: &Address,
        amount: u128,
        now: u64,
        env: &mut Collaborators<'_>,
        controller: &dyn WithdrawController,
    ) -> Result<()> {
        self.transact(|p| {
            p.access.require_not_paused()?;
            if amount == 0 {
                return Err(PortfolioError::InvalidParams("amount must be positive"));
            }
            p.bring_current(now, env.fees)?;
            let ctx = p.operation_context(index)?;
            controller
                .on_withdraw(&ctx, receiver, amount)
                .map_err(PortfolioError::ControllerRejected)?;

            p.apply_debit(index, amount)?;
            env.token
                .transfer(&p.address, receiver, amount)
                .map_err(transfer_failed)?;
            Ok(())
        })
    }

    /// Deploy `amount` of pool capital into an allow-listed vault
    ///
    /// The deployed amount moves from the virtual balance to receivables, so
    /// backing is unchanged until the manager marks the position. The
    /// recipient's hook is notified after commit and may fail harmlessly.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &mut self,
        caller: &Address,
        to: Address,
        amount: u128,
        now: u64,
        env: &mut Collaborators<'_>,
        controller: &dyn TransferController,
        hook: Option<&mut dyn TransferHook>,
    ) -> Result<()> {
        self.transact(|p| {
            p.access.require_not_paused()?;
            p.access.require_role(Role::Manager, caller)?;
            if p.status != Status::Live {
                return Err(PortfolioError::InvalidState);
            }
            if !env.vaults.is_vault_added(&to) {
                return Err(PortfolioError::VaultNotRegistered);
            }
            controller
                .on_transfer(p.status, &to, amount)
                .map_err(PortfolioError::ControllerRejected)?;

            p.checkpoint_all(now, env.fees)?;
            p.virtual_token_balance = checked_sub_u128(p.virtual_token_balance, amount)?;
            p.receivables = checked_add_u128(p.receivables, amount)?;
            env.token
                .transfer(&p.address, &to, amount)
                .map_err(transfer_failed)?;

            info!("transferred {} to vault {}", amount, to);
            p.events.emit(Event::Transferred { to, amount });
            Ok(())
        })?;

        if let Some(hook) = hook {
            if let Err(reason) = hook.on_transfer(amount) {
                warn!("on_transfer hook of {} failed: {}", to, reason);
            }
        }
        Ok(())
    }

    /// Capital returned by an allow-listed vault
    pub fn receive_from_vault(
        &mut self,
        caller: &Address,
        amount: u128,
        now: u64,
        env: &mut Collaborators<'_>,
    ) -> Result<()> {
        self.transact(|p| {
            p.access.require_not_paused()?;
            if !env.vaults.is_vault_added(caller) {
                return Err(PortfolioError::VaultNotRegistered);
            }
            p.require_started()?;

            p.virtual_token_balance = checked_add_u128(p.virtual_token_balance, amount)?;
            p.receivables = saturating_sub(p.receivables, amount);
            p.checkpoint_all(now, env.fees)?;
            env.token
                .transfer(caller, &p.address, amount)
                .map_err(transfer_failed)?;

            info!("received {} from vault {}", amount, caller);
            p.events.emit(Event::ReceivablesUpdated { value: p.receivables });
            Ok(())
        })
    }

    /// Mark deployed capital to `value` and re-run the waterfall
    pub fn update_receivables(
        &mut self,
        caller: &Address,
        value: u128,
        now: u64,
        fees: &dyn FeeRateSource,
    ) -> Result<()> {
        self.transact(|p| {
            p.access.require_role(Role::Manager, caller)?;
            p.require_started()?;
            p.receivables = value;
            p.checkpoint_all(now, fees)?;

            info!("receivables marked at {}", value);
            p.events.emit(Event::ReceivablesUpdated { value });
            Ok(())
        })
    }

    /// Pay accrued protocol fees to the treasury, senior tranches first,
    /// as far as the backing covers them and the pool balance allows.
    /// Returns the amount paid.
    pub fn sweep_protocol_fees(&mut self, now: u64, env: &mut Collaborators<'_>) -> Result<u128> {
        self.transact(|p| {
            p.access.require_not_paused()?;
            let allocation = p.checkpoint_all(now, env.fees)?;

            let mut paid_total = 0u128;
            for index in (0..p.tranches.len()).rev() {
                let checkpoint = &mut p.tranches[index].checkpoint;
                let paid = min(allocation.backed_fees[index], p.virtual_token_balance);
                if paid == 0 {
                    continue;
                }
                checkpoint.unpaid_fees -= paid;
                p.virtual_token_balance -= paid;
                paid_total = checked_add_u128(paid_total, paid)?;
                p.events.emit(Event::ProtocolFeesPaid { tranche: index, amount: paid });
            }

            if paid_total > 0 {
                let treasury = env.fees.protocol_treasury();
                env.token
                    .transfer(&p.address, &treasury, paid_total)
                    .map_err(transfer_failed)?;
                info!("paid {} protocol fees to {}", paid_total, treasury);
            }
            Ok(paid_total)
        })
    }

    fn operation_context(&self, index: usize) -> Result<OperationContext> {
        let tranche = self.tranches.get(index).ok_or(PortfolioError::NotATranche)?;
        Ok(OperationContext {
            status: self.status,
            tranche: index,
            tranche_value: tranche.effective_value(),
        })
    }
}

fn transfer_failed(err: TransferError) -> PortfolioError {
    PortfolioError::TransferFailed(err.to_string())
}

// ============================================================================
// Roles and pause
// ============================================================================

impl Portfolio {
    pub fn grant_role(&mut self, caller: &Address, role: Role, account: Address) -> Result<()> {
        self.access.grant_role(caller, role, account, &mut self.events)
    }

    pub fn revoke_role(&mut self, caller: &Address, role: Role, account: &Address) -> Result<()> {
        self.access.revoke_role(caller, role, account, &mut self.events)
    }

    pub fn renounce_role(&mut self, caller: &Address, role: Role) -> Result<()> {
        let account = *caller;
        self.access.renounce_role(caller, role, &account, &mut self.events)
    }

    pub fn set_role_admin(&mut self, caller: &Address, role: Role, admin_role: Role) -> Result<()> {
        self.access.set_role_admin(caller, role, admin_role, &mut self.events)
    }

    pub fn pause(&mut self, caller: &Address) -> Result<()> {
        self.access.pause(caller, &mut self.events)
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<()> {
        self.access.unpause(caller, &mut self.events)
    }

    pub fn is_paused(&self) -> bool {
        self.access.is_paused()
    }
}
