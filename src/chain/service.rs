use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::store::PaymentOutput;

/// What a node reports about itself on connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub network_id: String,
    pub server_version: String,
    pub is_synced: bool,
}

/// A transaction built by the node wallet, waiting for the treasury signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    pub id: String,
    /// Hex-encoded digest to sign
    pub signing_hash: String,
    /// Opaque node-side encoding, passed back untouched on submit
    pub payload: serde_json::Value,
    pub output_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub id: String,
    pub payload: serde_json::Value,
    pub public_key: String,
    pub signature: String,
}

/// Transport to one ledger node
///
/// UTXO selection, fee computation and splitting of large output sets into
/// several transactions all happen on the node side.
#[async_trait]
pub trait LedgerService: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn server_info(&self) -> Result<ServerInfo, LedgerError>;

    /// Drop every address the node is tracking for us
    async fn clear_tracking(&self) -> Result<(), LedgerError>;

    async fn track_address(&self, address: &str) -> Result<(), LedgerError>;

    /// Build unsigned transactions covering all `outputs`, returning change
    /// to `change_address`
    async fn create_transactions(
        &self,
        outputs: &[PaymentOutput],
        change_address: &str,
    ) -> Result<Vec<UnsignedTransaction>, LedgerError>;

    /// Broadcast a signed transaction, returning its id
    async fn submit_transaction(&self, transaction: &SignedTransaction) -> Result<String, LedgerError>;
}
