//! Collateral balance rows
//!
//! One [`Balance`] per (trader, asset). Funds sit in exactly one of three
//! partitions:
//! - `available`: free to withdraw or reserve
//! - `reserved`: set aside against open orders or escrowed positions
//! - `in_flight`: leaving the row, waiting for a durable settlement commit
//!
//! Invariant: `available + reserved + in_flight == credited − debited`.
//! Every mutation either applies fully or leaves the row untouched.

use crate::errors::LedgerError;
use crate::ids::AccountId;
use crate::numeric::Amount;
use serde::{Deserialize, Serialize};

/// Balance for a single (account, asset) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub asset: String,
    pub available: Amount,
    pub reserved: Amount,
    pub in_flight: Amount,
    /// Deposits and incoming transfers
    pub credited: Amount,
    /// Withdrawals and outgoing transfers
    pub debited: Amount,
    /// Set after an invariant violation; every further mutation fails
    pub frozen: bool,
    pub version: u64,
}

impl Balance {
    /// Create an empty balance row
    pub fn new(account_id: AccountId, asset: impl Into<String>) -> Self {
        Self {
            account_id,
            asset: asset.into(),
            available: Amount::ZERO,
            reserved: Amount::ZERO,
            in_flight: Amount::ZERO,
            credited: Amount::ZERO,
            debited: Amount::ZERO,
            frozen: false,
            version: 0,
        }
    }

    /// Sum of the three partitions
    pub fn total(&self) -> Option<Amount> {
        self.available
            .checked_add(self.reserved)?
            .checked_add(self.in_flight)
    }

    /// Net credits: `credited − debited`
    pub fn net(&self) -> Option<Amount> {
        self.credited.checked_sub(self.debited)
    }

    /// Check balance invariant: partitions sum to net credits
    pub fn check_invariant(&self) -> bool {
        matches!((self.total(), self.net()), (Some(total), Some(net)) if total == net)
    }

    /// Credit to available balance (deposit, incoming transfer)
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let available = self.add(self.available, amount)?;
        let credited = self.add(self.credited, amount)?;
        self.available = available;
        self.credited = credited;
        self.bump();
        Ok(())
    }

    /// Debit from available balance (withdrawal)
    pub fn debit_available(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let available = self.take_available(amount)?;
        let debited = self.add(self.debited, amount)?;
        self.available = available;
        self.debited = debited;
        self.bump();
        Ok(())
    }

    /// Move available → reserved
    pub fn reserve(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let available = self.take_available(amount)?;
        let reserved = self.add(self.reserved, amount)?;
        self.available = available;
        self.reserved = reserved;
        self.bump();
        Ok(())
    }

    /// Move reserved → available
    pub fn release(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let reserved = self.take(self.reserved, amount, "reserved")?;
        let available = self.add(self.available, amount)?;
        self.reserved = reserved;
        self.available = available;
        self.bump();
        Ok(())
    }

    /// Debit reserved balance directly (outgoing transfer)
    pub fn debit_reserved(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let reserved = self.take(self.reserved, amount, "reserved")?;
        let debited = self.add(self.debited, amount)?;
        self.reserved = reserved;
        self.debited = debited;
        self.bump();
        Ok(())
    }

    /// Move reserved → in-flight
    pub fn begin_transfer(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let reserved = self.take(self.reserved, amount, "reserved")?;
        let in_flight = self.add(self.in_flight, amount)?;
        self.reserved = reserved;
        self.in_flight = in_flight;
        self.bump();
        Ok(())
    }

    /// Debit in-flight balance (transfer durably committed)
    pub fn debit_in_flight(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let in_flight = self.take(self.in_flight, amount, "in_flight")?;
        let debited = self.add(self.debited, amount)?;
        self.in_flight = in_flight;
        self.debited = debited;
        self.bump();
        Ok(())
    }

    /// Move in-flight → reserved (transfer abandoned)
    pub fn abort_transfer(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_active()?;
        let in_flight = self.take(self.in_flight, amount, "in_flight")?;
        let reserved = self.add(self.reserved, amount)?;
        self.in_flight = in_flight;
        self.reserved = reserved;
        self.bump();
        Ok(())
    }

    /// Freeze the row after an invariant violation
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.frozen {
            return Err(LedgerError::Frozen {
                account: self.account_id.to_string(),
                asset: self.asset.clone(),
            });
        }
        Ok(())
    }

    fn take_available(&self, amount: Amount) -> Result<Amount, LedgerError> {
        self.available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: self.account_id.to_string(),
                asset: self.asset.clone(),
                required: amount,
                available: self.available,
            })
    }

    fn take(&self, held: Amount, amount: Amount, partition: &'static str) -> Result<Amount, LedgerError> {
        held.checked_sub(amount).ok_or_else(|| LedgerError::InvalidRelease {
            account: self.account_id.to_string(),
            asset: self.asset.clone(),
            partition,
            requested: amount,
            held,
        })
    }

    fn add(&self, held: Amount, amount: Amount) -> Result<Amount, LedgerError> {
        held.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            account: self.account_id.to_string(),
            asset: self.asset.clone(),
        })
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}
