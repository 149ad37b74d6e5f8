//! Postgres-backed inventory store.
//!
//! Snapshots and workflow documents are locked with `SELECT ... FOR UPDATE`
//! inside a transaction, so concurrent movements against the same key are
//! serialized by the database. The ledger table is append-only (a trigger
//! rejects UPDATE and DELETE).
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` | `Conflict` | Duplicate snapshot key, ledger id or document code |
//! | `40001` | `Conflict` | Serialization failure |
//! | `40P01` | `Conflict` | Deadlock detected |
//! | `55P03` | `Timeout` | `lock_timeout` exceeded |
//! | `57014` | `Timeout` | `statement_timeout` exceeded |
//! | Any other | `Backend` | Constraint, trigger or connection failures |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use stockflow_core::{DocumentType, LedgerEntryId, ProductId, UserId, WarehouseId};
use stockflow_inventory::{
    DocumentReference, LedgerEntry, MovementType, StockKey, StockSnapshot, StockThresholds,
};

use super::r#trait::{InventoryStore, StoreError, StoreTx, StoredDocument};

const MIGRATION_0001: &str = include_str!("../../migrations/0001_inventory_core.sql");

const SNAPSHOT_COLUMNS: &str =
    "product_id, warehouse_id, quantity, min_stock_level, max_stock_level, last_stock_check";

const LEDGER_COLUMNS: &str = "id, code, movement_type, product_id, warehouse_id, quantity_before, \
     quantity_change, quantity_after, document_type, document_id, document_code, from_warehouse, \
     to_warehouse, performed_by, recorded_at, notes";

/// Postgres-backed inventory store.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
    tx_timeout: Duration,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool, tx_timeout: Duration) -> Self {
        Self { pool, tx_timeout }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        tx_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(tx_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, tx_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION_0001)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        debug!("inventory schema applied");
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let timeout = format!("{}ms", self.tx_timeout.as_millis());
        for setting in ["lock_timeout", "statement_timeout"] {
            sqlx::query("SELECT set_config($1, $2, true)")
                .bind(setting)
                .bind(&timeout)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_timeouts", e))?;
        }
        Ok(PostgresTx { tx })
    }

    async fn snapshot(&self, key: StockKey) -> Result<Option<StockSnapshot>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots WHERE product_id = $1 AND warehouse_id = $2"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("snapshot", e))?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn snapshots_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockSnapshot>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots WHERE warehouse_id = $1 ORDER BY product_id"
        ))
        .bind(warehouse_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("snapshots_for_warehouse", e))?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn ledger_for(&self, key: StockKey) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger \
             WHERE product_id = $1 AND warehouse_id = $2 ORDER BY position ASC"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_for", e))?;

        rows.iter().map(ledger_from_row).collect()
    }

    async fn ledger_for_document(
        &self,
        document_type: DocumentType,
        document_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger \
             WHERE document_type = $1 AND document_id = $2 ORDER BY position ASC"
        ))
        .bind(document_type.as_str())
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_for_document", e))?;

        rows.iter().map(ledger_from_row).collect()
    }

    async fn load_document(
        &self,
        document_type: DocumentType,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let row = sqlx::query(
            "SELECT document_type, id, code, status, body FROM workflow_documents \
             WHERE document_type = $1 AND id = $2",
        )
        .bind(document_type.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_document", e))?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn next_sequence(&self, name: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO code_sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = code_sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_sequence", e))?;

        let value: i64 = row
            .try_get("value")
            .map_err(|e| StoreError::Serialization(format!("failed to read sequence value: {e}")))?;
        Ok(value as u64)
    }
}

/// Open Postgres transaction. Dropping it rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn snapshot_for_update(&mut self, key: StockKey) -> Result<Option<StockSnapshot>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stock_snapshots \
             WHERE product_id = $1 AND warehouse_id = $2 FOR UPDATE"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("snapshot_for_update", e))?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn insert_snapshot(&mut self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        let thresholds = snapshot.thresholds();
        sqlx::query(
            r#"
            INSERT INTO stock_snapshots (
                product_id, warehouse_id, quantity, min_stock_level, max_stock_level,
                stock_status, last_stock_check
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.product_id().as_uuid())
        .bind(snapshot.warehouse_id().as_uuid())
        .bind(snapshot.quantity())
        .bind(thresholds.min_stock_level)
        .bind(thresholds.max_stock_level)
        .bind(snapshot.stock_status().label())
        .bind(snapshot.last_stock_check())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_snapshot", e))?;
        Ok(())
    }

    async fn update_snapshot(&mut self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        let thresholds = snapshot.thresholds();
        let result = sqlx::query(
            r#"
            UPDATE stock_snapshots
            SET quantity = $3, min_stock_level = $4, max_stock_level = $5,
                stock_status = $6, last_stock_check = $7
            WHERE product_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(snapshot.product_id().as_uuid())
        .bind(snapshot.warehouse_id().as_uuid())
        .bind(snapshot.quantity())
        .bind(thresholds.min_stock_level)
        .bind(thresholds.max_stock_level)
        .bind(snapshot.stock_status().label())
        .bind(snapshot.last_stock_check())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_snapshot", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "snapshot for product {} in warehouse {}",
                snapshot.product_id(),
                snapshot.warehouse_id()
            )));
        }
        Ok(())
    }

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO stock_ledger ({LEDGER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(entry.id.as_uuid())
        .bind(&entry.code)
        .bind(entry.movement_type.label())
        .bind(entry.product_id.as_uuid())
        .bind(entry.warehouse_id.as_uuid())
        .bind(entry.quantity_before)
        .bind(entry.quantity_change)
        .bind(entry.quantity_after)
        .bind(entry.reference.document_type.as_str())
        .bind(entry.reference.document_id)
        .bind(&entry.reference.document_code)
        .bind(entry.from_warehouse.map(|w| *w.as_uuid()))
        .bind(entry.to_warehouse.map(|w| *w.as_uuid()))
        .bind(entry.performed_by.as_uuid())
        .bind(entry.recorded_at)
        .bind(&entry.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_ledger", e))?;
        Ok(())
    }

    async fn load_document_for_update(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let row = sqlx::query(
            "SELECT document_type, id, code, status, body FROM workflow_documents \
             WHERE document_type = $1 AND id = $2 FOR UPDATE",
        )
        .bind(document_type.as_str())
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_document_for_update", e))?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn insert_document(&mut self, document: &StoredDocument) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workflow_documents (document_type, id, code, status, body) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(document.document_type.as_str())
        .bind(document.id)
        .bind(&document.code)
        .bind(&document.status)
        .bind(&document.body)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_document", e))?;
        Ok(())
    }

    async fn update_document(
        &mut self,
        document: &StoredDocument,
        expected_status: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_documents
            SET code = $3, status = $4, body = $5, updated_at = NOW()
            WHERE document_type = $1 AND id = $2 AND status = $6
            "#,
        )
        .bind(document.document_type.as_str())
        .bind(document.id)
        .bind(&document.code)
        .bind(&document.status)
        .bind(&document.body)
        .bind(expected_status)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_document", e))?;

        if result.rows_affected() == 0 {
            return Err(self
                .stale_status(document.document_type, document.id, expected_status)
                .await);
        }
        Ok(())
    }

    async fn delete_document(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
        expected_status: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM workflow_documents WHERE document_type = $1 AND id = $2 AND status = $3",
        )
        .bind(document_type.as_str())
        .bind(id)
        .bind(expected_status)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("delete_document", e))?;

        if result.rows_affected() == 0 {
            return Err(self.stale_status(document_type, id, expected_status).await);
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

impl PostgresTx {
    /// Explain a conditional write that touched no rows.
    async fn stale_status(
        &mut self,
        document_type: DocumentType,
        id: Uuid,
        expected_status: &str,
    ) -> StoreError {
        let current = sqlx::query("SELECT status FROM workflow_documents WHERE document_type = $1 AND id = $2")
            .bind(document_type.as_str())
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await;
        match current {
            Ok(Some(row)) => {
                let status: String = row.try_get("status").unwrap_or_default();
                StoreError::Conflict(format!(
                    "{document_type} {id} is '{status}', expected '{expected_status}'"
                ))
            }
            Ok(None) => StoreError::NotFound(format!("{document_type} {id}")),
            Err(e) => map_sqlx_error("stale_status", e),
        }
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("55P03") | Some("57014") => StoreError::Timeout(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Serialization(format!("failed to read column {column}: {e}")))
}

fn snapshot_from_row(row: &PgRow) -> Result<StockSnapshot, StoreError> {
    let key = StockKey::new(
        ProductId::from_uuid(decode(row, "product_id")?),
        WarehouseId::from_uuid(decode(row, "warehouse_id")?),
    );
    let thresholds = StockThresholds::new(decode(row, "min_stock_level")?, decode(row, "max_stock_level")?)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let last_stock_check: DateTime<Utc> = decode(row, "last_stock_check")?;
    Ok(StockSnapshot::restore(key, decode(row, "quantity")?, thresholds, last_stock_check))
}

fn ledger_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let movement_type: String = decode(row, "movement_type")?;
    let document_type: String = decode(row, "document_type")?;
    let from_warehouse: Option<Uuid> = decode(row, "from_warehouse")?;
    let to_warehouse: Option<Uuid> = decode(row, "to_warehouse")?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(decode(row, "id")?),
        code: decode(row, "code")?,
        movement_type: movement_type
            .parse::<MovementType>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        product_id: ProductId::from_uuid(decode(row, "product_id")?),
        warehouse_id: WarehouseId::from_uuid(decode(row, "warehouse_id")?),
        quantity_before: decode(row, "quantity_before")?,
        quantity_change: decode(row, "quantity_change")?,
        quantity_after: decode(row, "quantity_after")?,
        reference: DocumentReference::new(
            document_type
                .parse::<DocumentType>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            decode(row, "document_id")?,
            decode::<String>(row, "document_code")?,
        ),
        from_warehouse: from_warehouse.map(WarehouseId::from_uuid),
        to_warehouse: to_warehouse.map(WarehouseId::from_uuid),
        performed_by: UserId::from_uuid(decode(row, "performed_by")?),
        recorded_at: decode(row, "recorded_at")?,
        notes: decode(row, "notes")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<StoredDocument, StoreError> {
    let document_type: String = decode(row, "document_type")?;
    Ok(StoredDocument {
        document_type: document_type
            .parse::<DocumentType>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        id: decode(row, "id")?,
        code: decode(row, "code")?,
        status: decode(row, "status")?,
        body: decode(row, "body")?,
    })
}
