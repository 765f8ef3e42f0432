// In-memory doubles for the store and the chain, shared by unit tests
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::chain::service::{LedgerService, ServerInfo, SignedTransaction, UnsignedTransaction};
use crate::chain::{BatchReceipt, LedgerClient};
use crate::error::{AppError, AppResult, LedgerError, SubmissionStage};
use crate::store::{Balance, BalanceStore, PaymentOutput, PaymentRecord};

// ========== STORE ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Reset(String),
    Record(String, u64, String),
}

#[derive(Default)]
pub struct MemoryStore {
    treasury_address: String,
    balances: Mutex<Vec<Balance>>,
    payments: Mutex<Vec<PaymentRecord>>,
    events: Mutex<Vec<StoreEvent>>,
    unavailable: AtomicBool,
    failing_resets: Mutex<HashSet<String>>,
    failing_records: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new(balances: &[(&str, i64)]) -> Self {
        Self {
            treasury_address: "testnet:treasury".to_string(),
            balances: Mutex::new(
                balances
                    .iter()
                    .map(|(address, amount)| Balance::new(*address, *amount))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_reset_for(&self, address: &str) {
        self.failing_resets.lock().insert(address.to_string());
    }

    pub fn fail_record_for(&self, address: &str) {
        self.failing_records.lock().insert(address.to_string());
    }

    /// Simulate the accounting side crediting a reward
    pub fn credit(&self, address: &str, amount: i64) {
        let mut balances = self.balances.lock();
        match balances.iter_mut().find(|b| b.address == address) {
            Some(balance) => balance.payable_amount += amount,
            None => balances.push(Balance::new(address, amount)),
        }
    }

    pub fn balance_of(&self, address: &str) -> Option<i64> {
        self.balances
            .lock()
            .iter()
            .find(|b| b.address == address)
            .map(|b| b.payable_amount)
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().clone()
    }

    pub fn payments(&self) -> Vec<PaymentRecord> {
        self.payments.lock().clone()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn list_payable_balances(&self) -> AppResult<Vec<Balance>> {
        self.check_available()?;
        Ok(self
            .balances
            .lock()
            .iter()
            .filter(|b| b.address != self.treasury_address)
            .cloned()
            .collect())
    }

    async fn reset_balance(&self, address: &str) -> AppResult<()> {
        self.check_available()?;
        if self.failing_resets.lock().contains(address) {
            return Err(AppError::StoreUnavailable(sqlx::Error::PoolClosed));
        }

        if let Some(balance) = self.balances.lock().iter_mut().find(|b| b.address == address) {
            balance.payable_amount = 0;
        }
        self.events.lock().push(StoreEvent::Reset(address.to_string()));
        Ok(())
    }

    async fn record_payment(
        &self,
        address: &str,
        amount: u64,
        transaction_id: &str,
    ) -> AppResult<PaymentRecord> {
        self.check_available()?;
        if self.failing_records.lock().contains(address) {
            return Err(AppError::StoreUnavailable(sqlx::Error::PoolClosed));
        }

        let record = PaymentRecord {
            id: Uuid::new_v4(),
            address: address.to_string(),
            amount,
            tx_id: transaction_id.to_string(),
            timestamp: Utc::now(),
            notified: false,
        };
        self.payments.lock().push(record.clone());
        self.events.lock().push(StoreEvent::Record(
            address.to_string(),
            amount,
            transaction_id.to_string(),
        ));
        Ok(record)
    }

    async fn list_unnotified_payments(&self, address: &str) -> AppResult<Vec<PaymentRecord>> {
        self.check_available()?;
        Ok(self
            .payments
            .lock()
            .iter()
            .filter(|p| p.address == address && !p.notified)
            .cloned()
            .collect())
    }

    async fn mark_notified(&self, id: Uuid) -> AppResult<()> {
        self.check_available()?;
        let mut payments = self.payments.lock();
        let payment = payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Payment {}", id)))?;
        payment.notified = true;
        Ok(())
    }
}

// ========== LEDGER CLIENT ==========

pub struct MockLedgerClient {
    transaction_id: String,
    ready: AtomicBool,
    failure_broadcast: Option<Vec<String>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
    batches: Mutex<Vec<Vec<PaymentOutput>>>,
}

impl MockLedgerClient {
    pub fn new(transaction_id: &str) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            ready: AtomicBool::new(true),
            failure_broadcast: None,
            gate: None,
            entered: Arc::new(Notify::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Fail every submission, pretending `broadcast` already went out
    pub fn failing(mut self, broadcast: &[&str]) -> Self {
        self.failure_broadcast = Some(broadcast.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Block inside `submit_batch` until the returned `Notify` is signalled
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Signalled once a submission has started
    pub fn entered(&self) -> Arc<Notify> {
        self.entered.clone()
    }

    pub fn batches(&self) -> Vec<Vec<PaymentOutput>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn submit_batch(&self, outputs: &[PaymentOutput]) -> AppResult<BatchReceipt> {
        self.batches.lock().push(outputs.to_vec());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(broadcast) = &self.failure_broadcast {
            return Err(LedgerError::SubmissionFailed {
                stage: SubmissionStage::Broadcast,
                index: broadcast.len() + 1,
                total: broadcast.len() + 1,
                broadcast: broadcast.clone(),
                message: "node rejected transaction".to_string(),
            }
            .into());
        }

        Ok(BatchReceipt {
            transaction_id: self.transaction_id.clone(),
            transaction_ids: vec![self.transaction_id.clone()],
        })
    }

    async fn on_reconnect(&self) -> AppResult<()> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

// ========== LEDGER SERVICE ==========

pub struct ScriptedLedgerService {
    endpoint: String,
    network: String,
    hanging: bool,
    max_outputs: usize,
    fail_submit_at: Option<usize>,
    calls: Mutex<Vec<String>>,
    submitted: Mutex<Vec<SignedTransaction>>,
}

impl ScriptedLedgerService {
    pub fn new(endpoint: &str, network: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            network: network.to_string(),
            hanging: false,
            max_outputs: usize::MAX,
            fail_submit_at: None,
            calls: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Never answer `server_info`
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }

    /// Split batches into transactions of at most `n` outputs
    pub fn max_outputs(mut self, n: usize) -> Self {
        self.max_outputs = n;
        self
    }

    /// Reject the n-th (1-based) broadcast
    pub fn fail_submit_at(mut self, n: usize) -> Self {
        self.fail_submit_at = Some(n);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl LedgerService for ScriptedLedgerService {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn server_info(&self) -> Result<ServerInfo, LedgerError> {
        self.calls.lock().push("server_info".to_string());
        if self.hanging {
            std::future::pending::<()>().await;
        }
        Ok(ServerInfo {
            network_id: self.network.clone(),
            server_version: "scripted".to_string(),
            is_synced: true,
        })
    }

    async fn clear_tracking(&self) -> Result<(), LedgerError> {
        self.calls.lock().push("clear_tracking".to_string());
        Ok(())
    }

    async fn track_address(&self, address: &str) -> Result<(), LedgerError> {
        self.calls.lock().push(format!("track_address {}", address));
        Ok(())
    }

    async fn create_transactions(
        &self,
        outputs: &[PaymentOutput],
        _change_address: &str,
    ) -> Result<Vec<UnsignedTransaction>, LedgerError> {
        self.calls
            .lock()
            .push(format!("create_transactions {}", outputs.len()));

        Ok(outputs
            .chunks(self.max_outputs)
            .enumerate()
            .map(|(i, chunk)| UnsignedTransaction {
                id: format!("unsigned-{}", i + 1),
                signing_hash: hex::encode([(i + 1) as u8; 32]),
                payload: serde_json::json!({ "outputs": chunk }),
                output_count: chunk.len(),
            })
            .collect())
    }

    async fn submit_transaction(&self, transaction: &SignedTransaction) -> Result<String, LedgerError> {
        let n = self.submitted.lock().len() + 1;
        self.calls.lock().push(format!("submit {}", transaction.id));

        if self.fail_submit_at == Some(n) {
            return Err(LedgerError::Rpc {
                method: "submitTransaction".to_string(),
                message: "orphan transaction".to_string(),
            });
        }

        self.submitted.lock().push(transaction.clone());
        Ok(format!("tx-{}", n))
    }
}
