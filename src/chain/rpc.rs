use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::service::{LedgerService, ServerInfo, SignedTransaction, UnsignedTransaction};
use crate::error::LedgerError;
use crate::store::PaymentOutput;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionsResult {
    transactions: Vec<UnsignedTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTransactionResult {
    transaction_id: String,
}

/// JSON-RPC 2.0 over HTTP to a single ledger node
pub struct RpcLedgerService {
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcLedgerService {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::ConnectionFailed {
                endpoint: endpoint.clone(),
                message: format!("Failed to build HTTP client: {:?}", e),
            })?;

        Ok(Self {
            endpoint,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!("→ {} {}", self.endpoint, method);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                message: format!("{} request failed: {:?}", method, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LedgerError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                message: format!("{} returned HTTP {}: {}", method, status, error_text),
            });
        }

        let body: RpcResponse = response.json().await.map_err(|e| LedgerError::Rpc {
            method: method.to_string(),
            message: format!("Failed to parse response: {:?}", e),
        })?;

        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                method: method.to_string(),
                message: format!("{} (code {})", error.message, error.code),
            });
        }

        // Methods without a meaningful result answer with `null`
        let result = body.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).map_err(|e| LedgerError::Rpc {
            method: method.to_string(),
            message: format!("Unexpected result shape: {}", e),
        })
    }
}

#[async_trait]
impl LedgerService for RpcLedgerService {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn server_info(&self) -> Result<ServerInfo, LedgerError> {
        self.call("getServerInfo", json!({})).await
    }

    async fn clear_tracking(&self) -> Result<(), LedgerError> {
        let _: serde_json::Value = self.call("clearTrackedAddresses", json!({})).await?;
        Ok(())
    }

    async fn track_address(&self, address: &str) -> Result<(), LedgerError> {
        let _: serde_json::Value = self
            .call("trackAddresses", json!({ "addresses": [address] }))
            .await?;
        Ok(())
    }

    async fn create_transactions(
        &self,
        outputs: &[PaymentOutput],
        change_address: &str,
    ) -> Result<Vec<UnsignedTransaction>, LedgerError> {
        let result: CreateTransactionsResult = self
            .call(
                "createTransactions",
                json!({
                    "outputs": outputs,
                    "changeAddress": change_address,
                    "priorityFee": 0,
                }),
            )
            .await?;

        Ok(result.transactions)
    }

    async fn submit_transaction(&self, transaction: &SignedTransaction) -> Result<String, LedgerError> {
        let result: SubmitTransactionResult = self
            .call("submitTransaction", json!({ "transaction": transaction }))
            .await?;

        Ok(result.transaction_id)
    }
}
