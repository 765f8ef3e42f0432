// Payout Orchestrator - runs one payout cycle end to end
//
// Cycle Flow:
// 1. Snapshot payable balances from the store
// 2. Shape them into payment outputs
// 3. Submit the batch through the ledger client
// 4. For every paid address: reset its balance, then record the payment
//
// Balances are only ever reset after the ledger client hands back a
// transaction id. Recording failures are logged per address and never fail
// the cycle.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::batcher::{build_batch, BatchPolicy};
use crate::chain::LedgerClient;
use crate::error::{AppError, LedgerError};
use crate::store::{BalanceStore, PaymentOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Snapshotting,
    Batching,
    Submitting,
    Settling,
    Recording,
}

/// Which per-address write failed after a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingStage {
    Reset,
    Record,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRecordingFailure {
    pub address: String,
    pub amount: u64,
    pub stage: RecordingStage,
    pub message: String,
}

impl fmt::Display for PartialRecordingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            RecordingStage::Reset => "reset",
            RecordingStage::Record => "record",
        };
        write!(f, "{} ({} {}): {}", self.address, stage, self.amount, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub transaction_id: String,
    pub transaction_ids: Vec<String>,
    pub paid: Vec<PaymentOutput>,
    /// Sum of `paid`; wider than a single amount so it cannot overflow
    pub total_paid: u128,
    pub failures: Vec<PartialRecordingFailure>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was in flight; this trigger was dropped
    Skipped,
    /// Nothing payable in the snapshot
    NoOutputs,
    Completed(CycleReport),
    Failed { stage: CycleState, error: AppError },
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Skipped => write!(f, "skipped"),
            CycleOutcome::NoOutputs => write!(f, "no outputs"),
            CycleOutcome::Completed(report) => {
                write!(
                    f,
                    "paid {} to {} address(es) in {} ({} transaction(s), {} recording failure(s))",
                    report.total_paid,
                    report.paid.len(),
                    report.transaction_id,
                    report.transaction_ids.len(),
                    report.failures.len()
                )?;
                for failure in &report.failures {
                    write!(f, "; {}", failure)?;
                }
                Ok(())
            }
            CycleOutcome::Failed { stage, error } => write!(f, "failed while {:?}: {}", stage, error),
        }
    }
}

pub struct PayoutOrchestrator {
    store: Arc<dyn BalanceStore>,
    ledger: Arc<dyn LedgerClient>,
    policy: BatchPolicy,
    busy: AtomicBool,
    state: Mutex<CycleState>,
    cycles: AtomicU64,
    dropped: AtomicU64,
}

/// Clears the busy flag when a cycle ends, however it ends
struct CycleGuard<'a> {
    orchestrator: &'a PayoutOrchestrator,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *self.orchestrator.state.lock() = CycleState::Idle;
        self.orchestrator.busy.store(false, Ordering::Release);
    }
}

impl PayoutOrchestrator {
    pub fn new(store: Arc<dyn BalanceStore>, ledger: Arc<dyn LedgerClient>, policy: BatchPolicy) -> Self {
        Self {
            store,
            ledger,
            policy,
            busy: AtomicBool::new(false),
            state: Mutex::new(CycleState::Idle),
            cycles: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Free to start a cycle and the ledger client holds a connection
    pub fn is_ready(&self) -> bool {
        !self.is_busy() && self.ledger.is_ready()
    }

    /// Cycles started since construction, excluding dropped triggers
    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn dropped_triggers(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    fn set_state(&self, state: CycleState) {
        debug!("Cycle state -> {:?}", state);
        *self.state.lock() = state;
    }

    /// Run one payout cycle. Never returns an error: failures end the cycle
    /// and are reported in the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("⏭️  Payout cycle already in progress, dropping trigger");
            return CycleOutcome::Skipped;
        }
        let _guard = CycleGuard { orchestrator: self };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.execute().instrument(info_span!("cycle", cycle)).await;

        match &outcome {
            CycleOutcome::Failed { .. } => error!("❌ Payout cycle {} {}", cycle, outcome),
            _ => info!("✓ Payout cycle {} {}", cycle, outcome),
        }

        outcome
    }

    async fn execute(&self) -> CycleOutcome {
        info!("🔄 Starting payout cycle");

        if !self.ledger.is_ready() {
            debug!("Ledger client not connected, submission will reconnect");
        }

        // 1. Snapshot
        self.set_state(CycleState::Snapshotting);
        let balances = match self.store.list_payable_balances().await {
            Ok(balances) => balances,
            Err(error) => {
                return CycleOutcome::Failed {
                    stage: CycleState::Snapshotting,
                    error,
                }
            }
        };
        debug!("📊 Snapshot holds {} balances", balances.len());

        // 2. Batch
        self.set_state(CycleState::Batching);
        let outputs = build_batch(&balances, &self.policy);
        if outputs.is_empty() {
            return CycleOutcome::NoOutputs;
        }

        let total_paid: u128 = outputs.iter().map(|o| u128::from(o.amount)).sum();
        info!("📦 Paying {} to {} address(es)", total_paid, outputs.len());

        // 3. Submit
        self.set_state(CycleState::Submitting);
        let receipt = match self.ledger.submit_batch(&outputs).await {
            Ok(receipt) => receipt,
            Err(error) => {
                if let AppError::Ledger(LedgerError::SubmissionFailed { broadcast, .. }) = &error {
                    if !broadcast.is_empty() {
                        error!(
                            "🚨 Batch partially broadcast, reconcile manually: {:?}",
                            broadcast
                        );
                    }
                }
                return CycleOutcome::Failed {
                    stage: CycleState::Submitting,
                    error,
                };
            }
        };

        self.set_state(CycleState::Settling);
        info!(
            "✓ Batch accepted: {} ({} transaction(s))",
            receipt.transaction_id,
            receipt.transaction_ids.len()
        );

        // 4. Record
        self.set_state(CycleState::Recording);
        let failures = self.record_batch(&outputs, &receipt.transaction_id).await;

        CycleOutcome::Completed(CycleReport {
            transaction_id: receipt.transaction_id,
            transaction_ids: receipt.transaction_ids,
            paid: outputs,
            total_paid,
            failures,
        })
    }

    async fn record_batch(
        &self,
        outputs: &[PaymentOutput],
        transaction_id: &str,
    ) -> Vec<PartialRecordingFailure> {
        let mut failures = Vec::new();

        for output in outputs {
            if let Err(e) = self.store.reset_balance(&output.address).await {
                warn!(
                    "⚠️  Paid {} to {} in {} but balance reset failed: {}",
                    output.amount, output.address, transaction_id, e
                );
                failures.push(PartialRecordingFailure {
                    address: output.address.clone(),
                    amount: output.amount,
                    stage: RecordingStage::Reset,
                    message: e.to_string(),
                });
                continue;
            }

            match self
                .store
                .record_payment(&output.address, output.amount, transaction_id)
                .await
            {
                Ok(record) => debug!("Recorded payment {} for {}", record.id, output.address),
                Err(e) => {
                    warn!(
                        "⚠️  Balance of {} reset but payment history write failed: {}",
                        output.address, e
                    );
                    failures.push(PartialRecordingFailure {
                        address: output.address.clone(),
                        amount: output.amount,
                        stage: RecordingStage::Record,
                        message: e.to_string(),
                    });
                }
            }
        }

        failures
    }
}
