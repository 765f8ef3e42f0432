use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::BigDecimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Unpaid reward credited to one address, in base units.
///
/// Read as-is from the store; a negative amount is possible if the
/// accounting side ever over-debits, and is filtered out before payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub address: String,
    pub payable_amount: i64,
}

impl Balance {
    pub fn new(address: impl Into<String>, payable_amount: i64) -> Self {
        Self {
            address: address.into(),
            payable_amount,
        }
    }
}

/// One (address, amount) output of a payout batch. `amount` is always > 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub address: String,
    pub amount: u64,
}

impl PaymentOutput {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Payment history entry, created once per paid address per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub address: String,
    pub amount: u64,
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub notified: bool,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct BalanceRow {
    pub address: String,
    pub available_balance: BigDecimal,
}

impl TryFrom<BalanceRow> for Balance {
    type Error = AppError;

    fn try_from(row: BalanceRow) -> AppResult<Self> {
        let amount = to_base_units(&row.available_balance)?;
        let payable_amount = amount.to_i64().ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Balance for {} out of range: {}",
                row.address, row.available_balance
            ))
        })?;

        Ok(Balance {
            address: row.address,
            payable_amount,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct PaymentRow {
    pub id: Uuid,
    pub address: String,
    pub amount: BigDecimal,
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub notified: bool,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> AppResult<Self> {
        let amount = to_base_units(&row.amount)?.to_u64().ok_or_else(|| {
            AppError::InvalidInput(format!("Payment {} has invalid amount: {}", row.id, row.amount))
        })?;

        Ok(PaymentRecord {
            id: row.id,
            address: row.address,
            amount,
            tx_id: row.tx_id,
            timestamp: row.timestamp,
            notified: row.notified,
        })
    }
}

/// NUMERIC -> whole base units. Fractions below one base unit are dropped.
fn to_base_units(value: &BigDecimal) -> AppResult<Decimal> {
    let decimal = Decimal::from_str(&value.to_string())?;
    Ok(decimal.trunc())
}

pub(crate) fn to_numeric(amount: u64) -> AppResult<BigDecimal> {
    BigDecimal::from_str(&amount.to_string())
        .map_err(|e| AppError::InvalidInput(format!("Invalid amount {}: {:?}", amount, e)))
}
