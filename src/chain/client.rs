use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::service::LedgerService;
use super::signer::TreasurySigner;
use super::{BatchReceipt, LedgerClient};
use crate::error::{AppResult, LedgerError, SubmissionStage};
use crate::store::PaymentOutput;

/// Ledger client that signs with the treasury key and talks to the first
/// reachable node out of a configured list
pub struct TreasuryLedgerClient {
    network: String,
    services: Vec<Arc<dyn LedgerService>>,
    signer: TreasurySigner,
    settle_delay: Duration,
    connect_timeout: Duration,
    /// Index into `services` of the live connection
    active: Mutex<Option<usize>>,
}

impl TreasuryLedgerClient {
    pub fn new(
        network: impl Into<String>,
        services: Vec<Arc<dyn LedgerService>>,
        signer: TreasurySigner,
        settle_delay: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            network: network.into(),
            services,
            signer,
            settle_delay,
            connect_timeout,
            active: Mutex::new(None),
        }
    }

    pub fn treasury_address(&self) -> &str {
        self.signer.address()
    }

    /// Connect to the first endpoint that answers within the timeout and
    /// reports the expected network, then reset address tracking on it.
    pub async fn connect(&self) -> AppResult<()> {
        *self.active.lock() = None;

        for (index, service) in self.services.iter().enumerate() {
            if let Err(e) = self.probe(service.as_ref()).await {
                warn!("⚠️  Ledger endpoint {} unusable: {}", service.endpoint(), e);
                continue;
            }

            *self.active.lock() = Some(index);

            match self.on_reconnect().await {
                Ok(()) => {
                    info!("✅ Connected to ledger node {}", service.endpoint());
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "⚠️  Address tracking failed on {}: {}",
                        service.endpoint(),
                        e
                    );
                    *self.active.lock() = None;
                }
            }
        }

        Err(LedgerError::NoEndpointReachable {
            attempted: self.services.len(),
        }
        .into())
    }

    async fn probe(&self, service: &dyn LedgerService) -> Result<(), LedgerError> {
        let info = tokio::time::timeout(self.connect_timeout, service.server_info())
            .await
            .map_err(|_| LedgerError::ConnectTimeout {
                endpoint: service.endpoint().to_string(),
                secs: self.connect_timeout.as_secs(),
            })??;

        if info.network_id != self.network {
            return Err(LedgerError::NetworkMismatch {
                expected: self.network.clone(),
                actual: info.network_id,
            });
        }

        if !info.is_synced {
            warn!("⚠️  Ledger node {} is not synced yet", service.endpoint());
        }

        debug!(
            "Ledger node {} running {}",
            service.endpoint(),
            info.server_version
        );
        Ok(())
    }

    fn active_service(&self) -> Option<Arc<dyn LedgerService>> {
        let active = *self.active.lock();
        active.and_then(|index| self.services.get(index).cloned())
    }

    async fn ensure_connected(&self) -> AppResult<Arc<dyn LedgerService>> {
        if let Some(service) = self.active_service() {
            return Ok(service);
        }

        info!("🔌 Ledger connection lost, reconnecting...");
        self.connect().await?;

        self.active_service().ok_or_else(|| {
            LedgerError::NoEndpointReachable {
                attempted: self.services.len(),
            }
            .into()
        })
    }

    /// A transport failure means the node is gone; the next submission
    /// reconnects first.
    fn note_failure(&self, error: &LedgerError) {
        if error.is_transport() {
            *self.active.lock() = None;
        }
    }
}

fn submission_failed(
    stage: SubmissionStage,
    index: usize,
    total: usize,
    broadcast: &[String],
    message: impl Into<String>,
) -> LedgerError {
    LedgerError::SubmissionFailed {
        stage,
        index,
        total,
        broadcast: broadcast.to_vec(),
        message: message.into(),
    }
}

#[async_trait]
impl LedgerClient for TreasuryLedgerClient {
    #[instrument(skip(self, outputs), fields(outputs = outputs.len()))]
    async fn submit_batch(&self, outputs: &[PaymentOutput]) -> AppResult<BatchReceipt> {
        if outputs.is_empty() {
            return Err(submission_failed(SubmissionStage::Build, 0, 0, &[], "empty batch").into());
        }

        let service = self
            .ensure_connected()
            .await
            .map_err(|e| submission_failed(SubmissionStage::Connect, 0, 0, &[], e.to_string()))?;

        let unsigned = match service
            .create_transactions(outputs, self.signer.address())
            .await
        {
            Ok(transactions) if transactions.is_empty() => {
                return Err(submission_failed(
                    SubmissionStage::Build,
                    0,
                    0,
                    &[],
                    "node built no transactions",
                )
                .into());
            }
            Ok(transactions) => transactions,
            Err(e) => {
                self.note_failure(&e);
                return Err(
                    submission_failed(SubmissionStage::Build, 0, 0, &[], e.to_string()).into(),
                );
            }
        };

        let total = unsigned.len();
        info!(
            "📦 Submitting {} outputs in {} transaction(s)",
            outputs.len(),
            total
        );

        let mut broadcast: Vec<String> = Vec::with_capacity(total);

        for (position, transaction) in unsigned.iter().enumerate() {
            let index = position + 1;

            // Let the previous transaction's change settle before spending again
            if position > 0 {
                debug!("Settling for {:?} before transaction {}/{}", self.settle_delay, index, total);
                tokio::time::sleep(self.settle_delay).await;
            }

            let signed = self.signer.sign(transaction).map_err(|e| {
                submission_failed(SubmissionStage::Sign, index, total, &broadcast, e.to_string())
            })?;

            match service.submit_transaction(&signed).await {
                Ok(transaction_id) => {
                    info!(
                        "✓ Transaction {}/{} broadcast: {} ({} outputs)",
                        index, total, transaction_id, transaction.output_count
                    );
                    broadcast.push(transaction_id);
                }
                Err(e) => {
                    self.note_failure(&e);
                    return Err(submission_failed(
                        SubmissionStage::Broadcast,
                        index,
                        total,
                        &broadcast,
                        e.to_string(),
                    )
                    .into());
                }
            }
        }

        let transaction_id = broadcast
            .last()
            .cloned()
            .ok_or_else(|| submission_failed(SubmissionStage::Broadcast, total, total, &[], "nothing broadcast"))?;

        Ok(BatchReceipt {
            transaction_id,
            transaction_ids: broadcast,
        })
    }

    async fn on_reconnect(&self) -> AppResult<()> {
        let service = self
            .active_service()
            .ok_or(LedgerError::NoEndpointReachable { attempted: 0 })?;

        service.clear_tracking().await?;
        service.track_address(self.signer.address()).await?;

        info!("🔁 Tracking treasury address {}", self.signer.address());
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.active.lock().is_some()
    }
}
