// Ledger client: everything that touches the chain goes through here
pub mod client;
pub mod rpc;
pub mod service;
pub mod signer;

pub use client::TreasuryLedgerClient;
pub use rpc::RpcLedgerService;
pub use service::LedgerService;
pub use signer::TreasurySigner;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::store::PaymentOutput;

/// Outcome of a successfully submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    /// Id of the final underlying transaction, used as the batch id
    pub transaction_id: String,
    /// Every broadcast transaction, in submission order
    pub transaction_ids: Vec<String>,
}

/// LedgerClient trait - the payout core's view of the chain
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Pay every output, possibly across several transactions.
    ///
    /// INVARIANTS:
    /// - Transactions are broadcast one at a time, with the settling delay
    ///   between consecutive ones
    /// - On failure, transactions already broadcast stay broadcast; their ids
    ///   are carried in `LedgerError::SubmissionFailed`
    async fn submit_batch(&self, outputs: &[PaymentOutput]) -> AppResult<BatchReceipt>;

    /// Re-establish address tracking after a (re)connect
    async fn on_reconnect(&self) -> AppResult<()>;

    fn is_ready(&self) -> bool;
}
