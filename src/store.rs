//! Record store access
//!
//! The persistent store is an external collaborator; this core only needs a
//! generic "select rows where column = value" capability over named tables,
//! returning loosely-typed rows. No writes happen here.

use crate::error::AgentError;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

/// Closed catalog of queryable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Accounts,
    Cards,
    Loans,
    Transactions,
    Holdings,
    Goals,
    RewardProfiles,
    RewardActivity,
    SupportTickets,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Cards => "cards",
            Table::Loans => "loans",
            Table::Transactions => "transactions",
            Table::Holdings => "holdings",
            Table::Goals => "goals",
            Table::RewardProfiles => "reward_profiles",
            Table::RewardActivity => "reward_activity",
            Table::SupportTickets => "support_tickets",
        }
    }
}

/// Read-only row access, scoped by a single equality filter.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: Table, column: &str, value: &str) -> Result<Vec<Value>>;
}

//
// ================= In-memory store =================
//

/// In-memory store for development and tests.
pub struct InMemoryRecordStore {
    rows: Arc<RwLock<HashMap<Table, Vec<Value>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed a row; used by the demo binary and tests only.
    pub async fn insert(&self, table: Table, row: Value) {
        let mut rows = self.rows.write().await;
        rows.entry(table).or_insert_with(Vec::new).push(row);
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn column_matches(row: &Value, column: &str, value: &str) -> bool {
    match row.get(column) {
        Some(Value::String(s)) => s == value,
        Some(Value::Number(n)) => n.to_string() == value,
        _ => false,
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(&self, table: Table, column: &str, value: &str) -> Result<Vec<Value>> {
        let rows = self.rows.read().await;

        Ok(rows
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| column_matches(row, column, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

//
// ================= Postgres store =================
//

/// Postgres-backed store. Rows live in one JSONB table keyed by logical
/// table name, so the generic select stays a single parameterized query.
pub struct PostgresRecordStore {
    pool: sqlx::PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresRecordStore {
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| AgentError::StoreError(format!("Failed to configure pool: {}", e)))?;

        info!("Record store backend: postgres");

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS financial_records (
                      record_id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                      table_name TEXT NOT NULL,
                      data JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_financial_records_table
                    ON financial_records (table_name);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::StoreError(format!("Failed to initialize record schema: {}", e))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresRecordStore {
    async fn select(&self, table: Table, column: &str, value: &str) -> Result<Vec<Value>> {
        use sqlx::Row;

        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT data FROM financial_records
            WHERE table_name = $1 AND data->>$2 = $3
            "#,
        )
        .bind(table.name())
        .bind(column)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AgentError::StoreError(format!("Select from {} failed: {}", table.name(), e))
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<Value, _>("data").ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_select_filters_by_column() {
        let store = InMemoryRecordStore::new();
        store
            .insert(Table::Accounts, json!({"id": "a-1", "user_id": "u-1", "balance": 100.0}))
            .await;
        store
            .insert(Table::Accounts, json!({"id": "a-2", "user_id": "u-2", "balance": 250.0}))
            .await;

        let rows = store.select(Table::Accounts, "user_id", "u-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "a-1");
    }

    #[tokio::test]
    async fn test_select_unknown_table_is_empty() {
        let store = InMemoryRecordStore::new();
        let rows = store.select(Table::Loans, "user_id", "u-1").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_select_matches_numeric_columns() {
        let store = InMemoryRecordStore::new();
        store
            .insert(Table::Transactions, json!({"id": "t-1", "account_id": 42}))
            .await;

        let rows = store
            .select(Table::Transactions, "account_id", "42")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
