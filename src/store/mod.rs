pub mod models;
pub mod repository;

pub use models::{Balance, PaymentOutput, PaymentRecord};
pub use repository::PaymentRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;

/// Balance store - the only place payout state is persisted
///
/// The three cycle operations are not transactionally coupled: the
/// accounting side may credit an address between the snapshot read and
/// its reset.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Snapshot of every balance except the treasury's own
    async fn list_payable_balances(&self) -> AppResult<Vec<Balance>>;

    /// Zero an address's balance. Already zero (or unknown) is not an error.
    async fn reset_balance(&self, address: &str) -> AppResult<()>;

    /// Append one payment history entry with `notified = false`
    async fn record_payment(
        &self,
        address: &str,
        amount: u64,
        transaction_id: &str,
    ) -> AppResult<PaymentRecord>;

    /// Payments for `address` not yet picked up by the notifier, oldest first
    async fn list_unnotified_payments(&self, address: &str) -> AppResult<Vec<PaymentRecord>>;

    async fn mark_notified(&self, id: Uuid) -> AppResult<()>;
}
