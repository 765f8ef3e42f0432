use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::*;
use super::BalanceStore;
use crate::error::{AppError, AppResult};

/// PostgreSQL-backed balance store
pub struct PaymentRepository {
    pool: PgPool,
    treasury_address: String,
}

impl PaymentRepository {
    pub fn new(pool: PgPool, treasury_address: impl Into<String>) -> Self {
        Self {
            pool,
            treasury_address: treasury_address.into(),
        }
    }

    /// Open the pool and bring the schema up to date
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        treasury_address: impl Into<String>,
    ) -> AppResult<Self> {
        info!("📊 Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("🔄 Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✓ Database initialized ({} max connections)", max_connections);
        Ok(Self::new(pool, treasury_address))
    }
}

#[async_trait]
impl BalanceStore for PaymentRepository {
    // ========== BALANCE OPERATIONS ==========

    async fn list_payable_balances(&self) -> AppResult<Vec<Balance>> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT address, available_balance
            FROM balances
            WHERE address <> $1
            ORDER BY address
            "#,
        )
        .bind(&self.treasury_address)
        .fetch_all(&self.pool)
        .await?;

        debug!("Read {} balance rows", rows.len());

        rows.into_iter().map(Balance::try_from).collect()
    }

    async fn reset_balance(&self, address: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE balances
            SET available_balance = 0, updated_at = NOW()
            WHERE address = $1
            "#,
        )
        .bind(address)
        .execute(&self.pool)
        .await?;

        debug!(
            "Reset balance for {} ({} rows)",
            address,
            result.rows_affected()
        );

        Ok(())
    }

    // ========== PAYMENT HISTORY ==========

    async fn record_payment(
        &self,
        address: &str,
        amount: u64,
        transaction_id: &str,
    ) -> AppResult<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (id, address, amount, tx_id, timestamp, notified)
            VALUES ($1, $2, $3, $4, NOW(), FALSE)
            RETURNING id, address, amount, tx_id, timestamp, notified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(address)
        .bind(to_numeric(amount)?)
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        PaymentRecord::try_from(row)
    }

    async fn list_unnotified_payments(&self, address: &str) -> AppResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, address, amount, tx_id, timestamp, notified
            FROM payments
            WHERE address = $1 AND notified = FALSE
            ORDER BY timestamp ASC
            "#,
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn mark_notified(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET notified = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Payment {}", id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a scratch database: DATABASE_URL=... cargo test -- --ignored
    async fn repository() -> PaymentRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PaymentRepository::connect(&url, 2, "testnet:treasury")
            .await
            .unwrap()
    }

    async fn seed(repo: &PaymentRepository, address: &str, amount: i64) {
        sqlx::query(
            r#"
            INSERT INTO balances (address, available_balance)
            VALUES ($1, $2)
            ON CONFLICT (address) DO UPDATE SET available_balance = EXCLUDED.available_balance
            "#,
        )
        .bind(address)
        .bind(to_numeric(amount as u64).unwrap())
        .execute(&repo.pool)
        .await
        .unwrap();
    }

    fn unique(prefix: &str) -> String {
        format!("testnet:{}-{}", prefix, Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_reset_is_idempotent() {
        let repo = repository().await;
        let address = unique("miner");
        seed(&repo, &address, 500).await;

        repo.reset_balance(&address).await.unwrap();
        repo.reset_balance(&address).await.unwrap();

        let balances = repo.list_payable_balances().await.unwrap();
        let balance = balances.iter().find(|b| b.address == address).unwrap();
        assert_eq!(balance.payable_amount, 0);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_treasury_excluded_from_snapshot() {
        let repo = repository().await;
        seed(&repo, "testnet:treasury", 1_000_000).await;

        let balances = repo.list_payable_balances().await.unwrap();
        assert!(balances.iter().all(|b| b.address != "testnet:treasury"));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_payment_history_and_notification() {
        let repo = repository().await;
        let address = unique("miner");

        let record = repo.record_payment(&address, 1200, "T1").await.unwrap();
        assert_eq!(record.amount, 1200);
        assert!(!record.notified);

        let pending = repo.list_unnotified_payments(&address).await.unwrap();
        assert_eq!(pending, vec![record.clone()]);

        repo.mark_notified(record.id).await.unwrap();
        assert!(repo.list_unnotified_payments(&address).await.unwrap().is_empty());

        let missing = repo.mark_notified(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
