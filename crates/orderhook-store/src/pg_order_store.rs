//! `PostgreSQL` implementation of the `OrderStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use orderhook_core::error::DomainError;
use orderhook_core::order::{Order, OrderFields, OrderUpdate, UpsertOutcome, resolve_update};
use orderhook_core::repository::OrderStore;

/// Schema migrations shipped with the workspace.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// PostgreSQL-backed order store.
///
/// Every upsert runs in one transaction holding a transaction-scoped
/// advisory lock on the order id, so concurrent deliveries for one order
/// serialize even before the order row exists.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    environment: String,
    status: String,
    fields: Json<OrderFields>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            environment: row.environment.parse().map_err(corrupt_row)?,
            status: row.status.parse().map_err(corrupt_row)?,
            order_id: row.order_id,
            fields: row.fields.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn corrupt_row(err: DomainError) -> DomainError {
    DomainError::Infrastructure(format!("unreadable order row: {err}"))
}

fn db_error(err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {err}"))
}

const SELECT_ORDER: &str = r"
SELECT order_id, environment, status, fields, version, created_at, updated_at
FROM orders
WHERE order_id = $1
";

const SELECT_ORDER_FOR_UPDATE: &str = r"
SELECT order_id, environment, status, fields, version, created_at, updated_at
FROM orders
WHERE order_id = $1
FOR UPDATE
";

impl PgOrderStore {
    /// Creates a new `PgOrderStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_for_update(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(SELECT_ORDER_FOR_UPDATE)
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error(&e))?;
        row.map(Order::try_from).transpose()
    }

    async fn write_order(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO orders (order_id, environment, status, fields, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO UPDATE SET
                status = EXCLUDED.status,
                fields = EXCLUDED.fields,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&order.order_id)
        .bind(order.environment.as_str())
        .bind(order.status.as_str())
        .bind(Json(&order.fields))
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error(&e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(SELECT_ORDER)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;
        row.map(Order::try_from).transpose()
    }

    async fn upsert(
        &self,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(&e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&update.order_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&e))?;

        let seen: Option<(String,)> =
            sqlx::query_as("SELECT delivery_key FROM processed_deliveries WHERE delivery_key = $1")
                .bind(update.delivery.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error(&e))?;

        let current = Self::load_for_update(&mut tx, &update.order_id).await?;

        if seen.is_some() {
            if let Some(order) = current {
                tx.rollback().await.map_err(|e| db_error(&e))?;
                return Ok(UpsertOutcome::Duplicate(order));
            }
        }

        let outcome = resolve_update(current, update, now);
        if outcome.is_write() {
            Self::write_order(&mut tx, outcome.order()).await?;
        }

        sqlx::query(
            r"
            INSERT INTO processed_deliveries (delivery_key, order_id, event_type, outcome, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (delivery_key) DO NOTHING
            ",
        )
        .bind(update.delivery.as_str())
        .bind(&update.order_id)
        .bind(&update.event_type)
        .bind(outcome.label())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(&e))?;

        tx.commit().await.map_err(|e| db_error(&e))?;

        tracing::debug!(
            order_id = %update.order_id,
            delivery = %update.delivery,
            outcome = outcome.label(),
            "order upserted"
        );

        Ok(outcome)
    }

    async fn prune_deliveries(
        &self,
        processed_before: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM processed_deliveries WHERE processed_at < $1")
            .bind(processed_before)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;
        Ok(result.rows_affected())
    }
}
