//! Collateral ledger
//!
//! Rows are keyed by (account, asset) and each sits behind its own mutex,
//! so operations on different rows never contend. Operations touching two
//! rows lock them in key order.
//!
//! Failures split in two classes:
//! - expected rejections (`InsufficientFunds`) leave the row untouched
//! - bugs (`InvalidRelease`, `InvariantViolation`) are logged at `error`;
//!   an invariant violation also freezes the row until an operator steps in

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error};
use types::account::Balance;
use types::errors::LedgerError;
use types::ids::AccountId;
use types::numeric::Amount;

type RowKey = (AccountId, String);
type Row = Arc<Mutex<Balance>>;

/// Shared collateral ledger
#[derive(Debug, Default)]
pub struct Ledger {
    rows: DashMap<RowKey, Row>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to available.
    pub fn deposit(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), LedgerError> {
        self.with_row("deposit", account, asset, amount, |b| b.credit(amount))
    }

    /// Debit `amount` from available.
    pub fn withdraw(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), LedgerError> {
        self.with_row("withdraw", account, asset, amount, |b| b.debit_available(amount))
    }

    /// Move available → reserved; `InsufficientFunds` if available is short.
    pub fn reserve(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), LedgerError> {
        self.with_row("reserve", account, asset, amount, |b| b.reserve(amount))
    }

    /// Move reserved → available; `InvalidRelease` if reserved is short.
    pub fn release(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), LedgerError> {
        self.with_row("release", account, asset, amount, |b| b.release(amount))
    }

    /// Debit `from.reserved`, credit `to.available`, atomically.
    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        asset: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.move_between("transfer", from, to, asset, amount, Balance::debit_reserved)
    }

    /// Move reserved → in-flight ahead of a durable commit.
    pub fn begin_transfer(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), LedgerError> {
        self.with_row("begin_transfer", account, asset, amount, |b| b.begin_transfer(amount))
    }

    /// Debit `from.in_flight`, credit `to.available`, atomically.
    pub fn commit_transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        asset: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.move_between("commit_transfer", from, to, asset, amount, Balance::debit_in_flight)
    }

    /// Move in-flight → reserved after a failed commit.
    pub fn abort_transfer(&self, account: &AccountId, asset: &str, amount: Amount) -> Result<(), LedgerError> {
        self.with_row("abort_transfer", account, asset, amount, |b| b.abort_transfer(amount))
    }

    /// Snapshot of one row; an unknown row reads as empty.
    pub fn balance(&self, account: &AccountId, asset: &str) -> Balance {
        match self.rows.get(&(*account, asset.to_string())) {
            Some(row) => row.value().lock().clone(),
            None => Balance::new(*account, asset),
        }
    }

    /// Snapshot of every row.
    pub fn snapshot(&self) -> Vec<Balance> {
        self.all_rows().iter().map(|row| row.lock().clone()).collect()
    }

    /// Sum of `credited − debited` over every row of `asset`.
    ///
    /// Transfers cancel out, so this equals deposits minus withdrawals.
    pub fn net_supply(&self, asset: &str) -> Amount {
        self.snapshot()
            .iter()
            .filter(|b| b.asset == asset)
            .filter_map(Balance::net)
            .fold(Amount::ZERO, |acc, net| acc.checked_add(net).unwrap_or(acc))
    }

    /// Check every row; violating rows are frozen and reported.
    pub fn verify_invariants(&self) -> Vec<LedgerError> {
        let mut violations = Vec::new();
        for row in self.all_rows() {
            let mut balance = row.lock();
            if let Err(err) = Self::audit(&mut balance) {
                violations.push(err);
            }
        }
        violations
    }

    fn all_rows(&self) -> Vec<Row> {
        self.rows.iter().map(|entry| entry.value().clone()).collect()
    }

    fn row(&self, account: &AccountId, asset: &str) -> Row {
        self.rows
            .entry((*account, asset.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(Balance::new(*account, asset))))
            .value()
            .clone()
    }

    fn with_row<F>(
        &self,
        op: &'static str,
        account: &AccountId,
        asset: &str,
        amount: Amount,
        apply: F,
    ) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Balance) -> Result<(), LedgerError>,
    {
        let row = self.row(account, asset);
        let mut balance = row.lock();
        let result = apply(&mut balance);
        Self::report(op, &result, account, asset, amount);
        result?;
        Self::audit(&mut balance)
    }

    fn move_between(
        &self,
        op: &'static str,
        from: &AccountId,
        to: &AccountId,
        asset: &str,
        amount: Amount,
        debit: fn(&mut Balance, Amount) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        if from == to {
            let row = self.row(from, asset);
            let mut balance = row.lock();
            let before = balance.clone();
            let result = debit(&mut balance, amount).and_then(|_| balance.credit(amount));
            if result.is_err() {
                *balance = before;
            }
            Self::report(op, &result, from, asset, amount);
            result?;
            return Self::audit(&mut balance);
        }

        let from_row = self.row(from, asset);
        let to_row = self.row(to, asset);
        let (mut source, mut target) = if from < to {
            let source = from_row.lock();
            let target = to_row.lock();
            (source, target)
        } else {
            let target = to_row.lock();
            let source = from_row.lock();
            (source, target)
        };

        let before = source.clone();
        let result = debit(&mut source, amount).and_then(|_| target.credit(amount));
        if result.is_err() {
            *source = before;
        }
        Self::report(op, &result, from, asset, amount);
        result?;
        Self::audit(&mut source)?;
        Self::audit(&mut target)
    }

    fn report(op: &'static str, result: &Result<(), LedgerError>, account: &AccountId, asset: &str, amount: Amount) {
        match result {
            Ok(()) => debug!(account = %account, asset, amount = %amount, op, "ledger op"),
            Err(err) if err.is_fatal() => {
                error!(account = %account, asset, amount = %amount, op, error = %err, "ledger bug")
            }
            Err(err) => debug!(account = %account, asset, amount = %amount, op, error = %err, "ledger op rejected"),
        }
    }

    /// Freeze the row if its partitions no longer add up.
    fn audit(balance: &mut Balance) -> Result<(), LedgerError> {
        if balance.check_invariant() {
            return Ok(());
        }
        balance.freeze();
        let detail = format!(
            "available {} + reserved {} + in_flight {} != credited {} - debited {}",
            balance.available, balance.reserved, balance.in_flight, balance.credited, balance.debited
        );
        error!(account = %balance.account_id, asset = %balance.asset, %detail, "ledger invariant violated, row frozen");
        Err(LedgerError::InvariantViolation {
            account: balance.account_id.to_string(),
            asset: balance.asset.clone(),
            detail,
        })
    }
}
