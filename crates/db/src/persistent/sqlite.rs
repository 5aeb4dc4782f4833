//! SQLite implementation of the deposit store.

use std::future::Future;

use async_trait::async_trait;
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{debug, warn};
use tss_bridge_primitives::{
    chain::ChainId,
    deposit::{Deposit, DepositIdentifier, WithdrawalStatus},
};

use super::{
    config::DbConfig,
    errors::StorageError,
    models::DepositRecord,
    types::{DbAmount, DbWithdrawalStatus},
};
use crate::{
    deposits::{check_transition, DepositStore},
    errors::{DbError, DbResult},
};

/// Migrations embedded at build time.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const DEPOSIT_COLUMNS: &str = "tx_hash, tx_nonce, chain_id, source_address, deposit_amount, \
     deposit_token, deposit_block, destination_address, destination_chain_id, \
     withdrawal_amount, withdrawal_token, is_wrapped_token, referral_id, withdrawal_status, \
     withdrawal_tx_hash, signature, distributed";

/// Deposit store backed by a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
    config: DbConfig,
}

impl SqliteDb {
    /// Wraps an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            config: DbConfig::default(),
        }
    }

    /// Opens (creating if needed) the database file named in `config` and applies migrations.
    pub async fn connect(config: &DbConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        debug!(path = %config.path.display(), "running migrations");
        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Runs `op`, retrying transient failures as configured.
pub async fn execute_with_retries<F, Fut, T>(config: &DbConfig, mut op: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_retry_count && is_transient(&err) => {
                attempt += 1;
                warn!(%err, %attempt, "transient database error, retrying");
                tokio::time::sleep(config.backoff_period).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_transient(err: &DbError) -> bool {
    match err {
        DbError::Storage(StorageError::Driver(e)) => match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => {
                let msg = db.message();
                msg.contains("locked") || msg.contains("busy")
            }
            _ => false,
        },
        _ => false,
    }
}

fn to_i64(field: &str, value: u64) -> DbResult<i64> {
    i64::try_from(value).map_err(|_| {
        DbError::Storage(StorageError::MismatchedTypes(format!(
            "{field} out of range: {value}"
        )))
    })
}

#[async_trait]
impl DepositStore for SqliteDb {
    async fn insert_deposit(&self, deposit: &Deposit) -> DbResult<bool> {
        let pool = &self.pool;
        let tx_nonce = to_i64("tx_nonce", deposit.identifier.tx_nonce)?;
        let deposit_block = to_i64("deposit_block", deposit.deposit_block)?;
        let deposit_amount = DbAmount::from(deposit.deposit_amount);
        let withdrawal_amount = DbAmount::from(deposit.withdrawal_amount);
        let status = DbWithdrawalStatus::from(deposit.status);

        let inserted = execute_with_retries(&self.config, || async move {
            let result = sqlx::query(&format!(
                "INSERT INTO deposits ({DEPOSIT_COLUMNS})
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                    ON CONFLICT (tx_hash, tx_nonce, chain_id) DO NOTHING"
            ))
            .bind(&deposit.identifier.tx_hash)
            .bind(tx_nonce)
            .bind(deposit.identifier.chain_id.as_str())
            .bind(&deposit.source_address)
            .bind(deposit_amount)
            .bind(&deposit.deposit_token)
            .bind(deposit_block)
            .bind(&deposit.destination_address)
            .bind(deposit.destination_chain_id.as_str())
            .bind(withdrawal_amount)
            .bind(&deposit.withdrawal_token)
            .bind(deposit.is_wrapped_token)
            .bind(i64::from(deposit.referral_id))
            .bind(status)
            .bind(deposit.withdrawal_tx_hash.as_deref())
            .bind(deposit.signature.as_deref())
            .bind(deposit.distributed)
            .execute(pool)
            .await
            .map_err(StorageError::from)?;

            Ok(result.rows_affected() == 1)
        })
        .await?;

        debug!(id = %deposit.identifier, %inserted, "insert deposit");
        Ok(inserted)
    }

    async fn get_deposit(&self, id: &DepositIdentifier) -> DbResult<Option<Deposit>> {
        let pool = &self.pool;
        let tx_nonce = to_i64("tx_nonce", id.tx_nonce)?;

        let record = execute_with_retries(&self.config, || async move {
            let record: Option<DepositRecord> = sqlx::query_as(&format!(
                "SELECT {DEPOSIT_COLUMNS} FROM deposits
                    WHERE tx_hash = $1 AND tx_nonce = $2 AND chain_id = $3"
            ))
            .bind(&id.tx_hash)
            .bind(tx_nonce)
            .bind(id.chain_id.as_str())
            .fetch_optional(pool)
            .await
            .map_err(StorageError::from)?;

            Ok(record)
        })
        .await?;

        Ok(record.map(DepositRecord::into_typed).transpose()?)
    }

    async fn pending_deposits(&self, destination: &ChainId, limit: u32) -> DbResult<Vec<Deposit>> {
        let pool = &self.pool;
        let pending = DbWithdrawalStatus::from(WithdrawalStatus::Pending);

        let records = execute_with_retries(&self.config, || async move {
            let records: Vec<DepositRecord> = sqlx::query_as(&format!(
                "SELECT {DEPOSIT_COLUMNS} FROM deposits
                    WHERE destination_chain_id = $1 AND withdrawal_status = $2
                    ORDER BY id ASC
                    LIMIT $3"
            ))
            .bind(destination.as_str())
            .bind(pending)
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
            .map_err(StorageError::from)?;

            Ok(records)
        })
        .await?;

        records
            .into_iter()
            .map(|r| r.into_typed().map_err(DbError::from))
            .collect()
    }

    async fn undistributed_deposits(&self, limit: u32) -> DbResult<Vec<DepositIdentifier>> {
        let pool = &self.pool;
        let pending = DbWithdrawalStatus::from(WithdrawalStatus::Pending);

        let records = execute_with_retries(&self.config, || async move {
            let records: Vec<DepositRecord> = sqlx::query_as(&format!(
                "SELECT {DEPOSIT_COLUMNS} FROM deposits
                    WHERE withdrawal_status = $1 AND distributed = FALSE
                    ORDER BY id ASC
                    LIMIT $2"
            ))
            .bind(pending)
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
            .map_err(StorageError::from)?;

            Ok(records)
        })
        .await?;

        records
            .into_iter()
            .map(|r| {
                r.into_typed()
                    .map(|d| d.identifier)
                    .map_err(DbError::from)
            })
            .collect()
    }

    async fn mark_distributed(&self, ids: &[DepositIdentifier]) -> DbResult<()> {
        let pool = &self.pool;
        let rows = ids
            .iter()
            .map(|id| Ok((id, to_i64("tx_nonce", id.tx_nonce)?)))
            .collect::<DbResult<Vec<_>>>()?;
        let rows = &rows;

        execute_with_retries(&self.config, || async move {
            let mut tx = pool.begin().await.map_err(StorageError::from)?;

            for (id, tx_nonce) in rows {
                sqlx::query(
                    "UPDATE deposits SET distributed = TRUE
                        WHERE tx_hash = $1 AND tx_nonce = $2 AND chain_id = $3",
                )
                .bind(&id.tx_hash)
                .bind(*tx_nonce)
                .bind(id.chain_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            }

            tx.commit().await.map_err(StorageError::from)?;

            Ok(())
        })
        .await
    }

    async fn transition(
        &self,
        id: &DepositIdentifier,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> DbResult<bool> {
        check_transition(from, to)?;

        let pool = &self.pool;
        let tx_nonce = to_i64("tx_nonce", id.tx_nonce)?;
        let (from_db, to_db) = (DbWithdrawalStatus::from(from), DbWithdrawalStatus::from(to));

        let changed = execute_with_retries(&self.config, || async move {
            let result = sqlx::query(
                "UPDATE deposits SET withdrawal_status = $1
                    WHERE tx_hash = $2 AND tx_nonce = $3 AND chain_id = $4
                    AND withdrawal_status = $5",
            )
            .bind(to_db)
            .bind(&id.tx_hash)
            .bind(tx_nonce)
            .bind(id.chain_id.as_str())
            .bind(from_db)
            .execute(pool)
            .await
            .map_err(StorageError::from)?;

            Ok(result.rows_affected() == 1)
        })
        .await?;

        debug!(%id, %from, %to, %changed, "status transition");
        Ok(changed)
    }

    async fn mark_processed(
        &self,
        id: &DepositIdentifier,
        signature: Option<String>,
        withdrawal_tx_hash: Option<String>,
    ) -> DbResult<bool> {
        let pool = &self.pool;
        let tx_nonce = to_i64("tx_nonce", id.tx_nonce)?;
        let processing = DbWithdrawalStatus::from(WithdrawalStatus::Processing);
        let processed = DbWithdrawalStatus::from(WithdrawalStatus::Processed);
        let signature = signature.as_deref();
        let withdrawal_tx_hash = withdrawal_tx_hash.as_deref();

        let changed = execute_with_retries(&self.config, || async move {
            let result = sqlx::query(
                "UPDATE deposits SET
                    withdrawal_status = $1,
                    signature = COALESCE($2, signature),
                    withdrawal_tx_hash = COALESCE($3, withdrawal_tx_hash)
                    WHERE tx_hash = $4 AND tx_nonce = $5 AND chain_id = $6
                    AND withdrawal_status = $7",
            )
            .bind(processed)
            .bind(signature)
            .bind(withdrawal_tx_hash)
            .bind(&id.tx_hash)
            .bind(tx_nonce)
            .bind(id.chain_id.as_str())
            .bind(processing)
            .execute(pool)
            .await
            .map_err(StorageError::from)?;

            Ok(result.rows_affected() == 1)
        })
        .await?;

        debug!(%id, %changed, "mark processed");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use tss_bridge_primitives::amount::Amount;
    use tss_bridge_test_utils::prelude::*;

    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_insert_is_idempotent(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let deposit = generate_deposit("bitcoin", "1");

        assert!(
            db.insert_deposit(&deposit).await.is_ok_and(|v| v),
            "first insert must succeed"
        );

        let mut conflicting = deposit.clone();
        conflicting.withdrawal_amount = Amount::from(1);
        assert!(
            db.insert_deposit(&conflicting).await.is_ok_and(|v| !v),
            "second insert must be a no-op"
        );

        assert!(
            db.get_deposit(&deposit.identifier)
                .await
                .is_ok_and(|v| v == Some(deposit.clone())),
            "stored deposit must be the first one"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_status_is_compare_and_set(pool: SqlitePool) {
        let db = SqliteDb::new(pool);
        let deposit = generate_deposit("bitcoin", "1");
        let id = &deposit.identifier;
        db.insert_deposit(&deposit)
            .await
            .expect("must be able to insert");

        assert!(
            db.transition(id, WithdrawalStatus::Pending, WithdrawalStatus::Processing)
                .await
                .is_ok_and(|v| v),
            "pending deposit must move to processing"
        );
        assert!(
            db.transition(id, WithdrawalStatus::Pending, WithdrawalStatus::Processing)
                .await
                .is_ok_and(|v| !v),
            "second selection must not apply"
        );
        assert!(
            matches!(
                db.transition(id, WithdrawalStatus::Processed, WithdrawalStatus::Pending)
                    .await,
                Err(DbError::IllegalTransition(_))
            ),
            "terminal statuses must not be left"
        );

        assert!(
            db.mark_processed(id, Some("0xsig".into()), None)
                .await
                .is_ok_and(|v| v),
            "processing deposit must be processed"
        );

        let stored = db
            .get_deposit(id)
            .await
            .expect("must read")
            .expect("must exist");
        assert_eq!(stored.status, WithdrawalStatus::Processed);
        assert_eq!(stored.signature.as_deref(), Some("0xsig"));
        assert!(stored.withdrawal_tx_hash.is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_pending_and_distribution_queries(pool: SqlitePool) {
        let db = SqliteDb::new(pool);

        let to_evm: Vec<_> = (0..3).map(|_| generate_deposit("bitcoin", "1")).collect();
        let to_btc = generate_deposit("1", "bitcoin");
        let mut distributed = generate_deposit("bitcoin", "1");
        distributed.distributed = true;

        for d in to_evm.iter().chain([&to_btc, &distributed]) {
            db.insert_deposit(d).await.expect("must insert");
        }

        let pending = db
            .pending_deposits(&ChainId::from("1"), 10)
            .await
            .expect("must query");
        assert_eq!(pending.len(), 4);
        assert_eq!(pending[0], to_evm[0], "must be ordered by insertion");

        let undistributed = db.undistributed_deposits(10).await.expect("must query");
        assert_eq!(undistributed.len(), 4);
        assert!(!undistributed.contains(&distributed.identifier));

        db.mark_distributed(&undistributed[..2])
            .await
            .expect("must mark");
        let undistributed = db.undistributed_deposits(10).await.expect("must query");
        assert_eq!(undistributed.len(), 2);

        db.transition(
            &to_btc.identifier,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Invalid,
        )
        .await
        .expect("must transition");
        assert!(
            db.undistributed_deposits(10)
                .await
                .is_ok_and(|v| !v.contains(&to_btc.identifier)),
            "only pending deposits are distributed"
        );
    }

    #[tokio::test]
    async fn test_connect_creates_and_migrates() {
        let dir = tempfile::tempdir().expect("must create temp dir");
        let config = DbConfig::new(dir.path().join("deposits.db"));

        let db = SqliteDb::connect(&config).await.expect("must connect");
        let deposit = generate_deposit("bitcoin", "1");
        assert!(db.insert_deposit(&deposit).await.is_ok_and(|v| v));

        drop(db);
        let reopened = SqliteDb::connect(&config).await.expect("must reconnect");
        assert!(
            reopened
                .get_deposit(&deposit.identifier)
                .await
                .is_ok_and(|v| v.is_some()),
            "deposit must survive a restart"
        );
    }
}
