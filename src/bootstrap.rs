use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::{
    chain::{LedgerService, RpcLedgerService, TreasuryLedgerClient, TreasurySigner},
    config::{Config, Secrets},
    error::AppResult,
    payout::{BatchPolicy, PayoutOrchestrator, PayoutScheduleConfig, PayoutScheduler},
    store::PaymentRepository,
};

/// Everything the process needs to run, fully connected
pub struct PayoutService {
    pub orchestrator: Arc<PayoutOrchestrator>,
    pub scheduler: PayoutScheduler,
}

/// Wire the store, the ledger client and the payout core together.
///
/// Fails if the database or every ledger endpoint is unreachable; the
/// process must not start in a degraded mode.
pub async fn initialize_payout_service(config: &Config, secrets: &Secrets) -> AppResult<PayoutService> {
    info!("Initializing payout components ...");

    let signer = TreasurySigner::from_hex(&secrets.treasury_private_key, &config.network)?;
    let treasury_address = signer.address().to_string();

    // Database pool
    let store = Arc::new(
        PaymentRepository::connect(
            &secrets.database_url,
            config.max_db_connections,
            treasury_address,
        )
        .await?,
    );

    // Ledger client
    let request_timeout = config.connect_timeout().max(Duration::from_secs(30));
    let mut services: Vec<Arc<dyn LedgerService>> = Vec::with_capacity(config.node_endpoints.len());
    for endpoint in &config.node_endpoints {
        services.push(Arc::new(RpcLedgerService::new(endpoint.clone(), request_timeout)?));
    }

    let ledger = Arc::new(TreasuryLedgerClient::new(
        config.network.clone(),
        services,
        signer,
        config.settle_delay(),
        config.connect_timeout(),
    ));
    info!("🔑 Treasury address: {}", ledger.treasury_address());

    info!(
        "⚙️  Connecting to ledger network {} ({} endpoint(s))...",
        config.network,
        config.node_endpoints.len()
    );
    ledger.connect().await?;

    // Payout core
    let policy = BatchPolicy {
        min_payout: config.min_payout,
    };
    let orchestrator = Arc::new(PayoutOrchestrator::new(store, ledger, policy));
    info!("✅ Payout orchestrator ready (min payout {})", policy.min_payout);

    let scheduler = PayoutScheduler::new(
        PayoutScheduleConfig {
            interval_minutes: config.payout_interval_minutes,
            progress_interval: Duration::from_secs(u64::from(config.progress_interval_minutes) * 60),
        },
        orchestrator.clone(),
    );

    Ok(PayoutService {
        orchestrator,
        scheduler,
    })
}
