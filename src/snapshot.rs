//! Data snapshot loader
//!
//! Aggregates one user's records into an immutable snapshot under a time
//! budget. Accounts come first because their ids scope the transaction
//! fetch; the remaining tables load as one fan-out batch. Failures never
//! propagate: a failed fetch degrades to an empty collection and a blown
//! budget degrades to no snapshot at all.

use crate::budget::run_bounded;
use crate::models::{
    Account, Card, DataSnapshot, Holding, Loan, RewardEvent, RewardProfile, SavingsGoal,
    SupportTicket, Transaction,
};
use crate::store::{RecordStore, Table};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const PREFETCH_BUDGET: Duration = Duration::from_millis(3500);
const PREFETCH_BUDGET_FAST: Duration = Duration::from_millis(1200);

const TRANSACTION_LIMIT: usize = 100;
const TRANSACTION_LIMIT_FAST: usize = 25;

pub struct SnapshotLoader {
    store: Arc<dyn RecordStore>,
}

impl SnapshotLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Load a snapshot for `user_id`. `fast` shrinks both the time budget
    /// and the transaction row cap (voice path). Returns `None` when the
    /// budget expires; callers must treat that as degraded context, not
    /// failure.
    pub async fn load(&self, user_id: &str, fast: bool) -> Option<DataSnapshot> {
        let budget = if fast {
            PREFETCH_BUDGET_FAST
        } else {
            PREFETCH_BUDGET
        };

        run_bounded(
            "prefetch",
            budget,
            async { Some(self.load_unbounded(user_id, fast).await) },
            None,
        )
        .await
    }

    async fn load_unbounded(&self, user_id: &str, fast: bool) -> DataSnapshot {
        let accounts: Vec<Account> = self.fetch(Table::Accounts, user_id).await;

        // Secondary tables as one fan-out/fan-in batch.
        let (cards, loans, holdings, goals, reward_profiles, reward_activity, support_tickets): (
            Vec<Card>,
            Vec<Loan>,
            Vec<Holding>,
            Vec<SavingsGoal>,
            Vec<RewardProfile>,
            Vec<RewardEvent>,
            Vec<SupportTicket>,
        ) = tokio::join!(
            self.fetch(Table::Cards, user_id),
            self.fetch(Table::Loans, user_id),
            self.fetch(Table::Holdings, user_id),
            self.fetch(Table::Goals, user_id),
            self.fetch(Table::RewardProfiles, user_id),
            self.fetch(Table::RewardActivity, user_id),
            self.fetch(Table::SupportTickets, user_id),
        );

        let transactions = self.fetch_transactions(&accounts, fast).await;

        debug!(
            user_id = %user_id,
            accounts = accounts.len(),
            transactions = transactions.len(),
            "Snapshot loaded"
        );

        DataSnapshot {
            accounts,
            cards,
            loans,
            transactions,
            holdings,
            goals,
            reward_profile: reward_profiles.into_iter().next(),
            reward_activity,
            support_tickets,
        }
    }

    /// Transactions are scoped to the account-id set; with zero accounts
    /// the fetch is skipped entirely. Newest first, capped.
    async fn fetch_transactions(&self, accounts: &[Account], fast: bool) -> Vec<Transaction> {
        if accounts.is_empty() {
            return Vec::new();
        }

        let mut transactions: Vec<Transaction> = Vec::new();
        for account in accounts {
            let rows = match self
                .store
                .select(Table::Transactions, "account_id", &account.id)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(table = "transactions", account_id = %account.id, error = %e, "Fetch failed, continuing with empty rows");
                    continue;
                }
            };

            transactions.extend(
                rows.into_iter()
                    .filter_map(|row| serde_json::from_value::<Transaction>(row).ok()),
            );
        }

        transactions.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let limit = if fast {
            TRANSACTION_LIMIT_FAST
        } else {
            TRANSACTION_LIMIT
        };
        transactions.truncate(limit);

        transactions
    }

    async fn fetch<T: DeserializeOwned>(&self, table: Table, user_id: &str) -> Vec<T> {
        match self.store.select(table, "user_id", user_id).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| serde_json::from_value::<T>(row).ok())
                .collect(),
            Err(e) => {
                warn!(table = table.name(), error = %e, "Fetch failed, continuing with empty rows");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::store::InMemoryRecordStore;
    use crate::Result;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Store wrapper that records which tables were queried.
    struct TrackingStore {
        inner: InMemoryRecordStore,
        queried: Mutex<Vec<Table>>,
    }

    #[async_trait::async_trait]
    impl RecordStore for TrackingStore {
        async fn select(&self, table: Table, column: &str, value: &str) -> Result<Vec<Value>> {
            self.queried.lock().unwrap().push(table);
            self.inner.select(table, column, value).await
        }
    }

    /// Store whose secondary tables always fail; accounts still load.
    struct FailingSecondaryStore {
        inner: InMemoryRecordStore,
    }

    #[async_trait::async_trait]
    impl RecordStore for FailingSecondaryStore {
        async fn select(&self, table: Table, column: &str, value: &str) -> Result<Vec<Value>> {
            if table == Table::Accounts {
                self.inner.select(table, column, value).await
            } else {
                Err(AgentError::StoreError("secondary fetch down".to_string()))
            }
        }
    }

    async fn seeded_store() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store
            .insert(
                Table::Accounts,
                json!({"id": "a-1", "user_id": "u-1", "name": "Checking", "balance": 100.0}),
            )
            .await;
        store
            .insert(
                Table::Accounts,
                json!({"id": "a-2", "user_id": "u-1", "name": "Savings", "balance": 250.0}),
            )
            .await;
        for i in 0..40 {
            store
                .insert(
                    Table::Transactions,
                    json!({
                        "id": format!("t-{}", i),
                        "account_id": "a-1",
                        "description": format!("Purchase {}", i),
                        "amount": -10.0,
                        "occurred_at": format!("2026-07-{:02}T12:00:00Z", (i % 28) + 1),
                    }),
                )
                .await;
        }
        store
    }

    #[tokio::test]
    async fn test_zero_accounts_yields_empty_snapshot() {
        let store = TrackingStore {
            inner: InMemoryRecordStore::new(),
            queried: Mutex::new(Vec::new()),
        };
        let loader = SnapshotLoader::new(Arc::new(store));

        let snapshot = loader.load("nobody", false).await.unwrap();
        assert!(snapshot.accounts.is_empty());
        assert!(snapshot.transactions.is_empty());
        assert!(snapshot.cards.is_empty());
        assert!(snapshot.reward_profile.is_none());
    }

    #[tokio::test]
    async fn test_transaction_fetch_skipped_without_accounts() {
        let store = Arc::new(TrackingStore {
            inner: InMemoryRecordStore::new(),
            queried: Mutex::new(Vec::new()),
        });
        let loader = SnapshotLoader::new(store.clone());

        loader.load("nobody", false).await.unwrap();

        let queried = store.queried.lock().unwrap().clone();
        assert!(!queried.contains(&Table::Transactions));
        assert!(queried.contains(&Table::Accounts));
        assert!(queried.contains(&Table::Cards));
    }

    #[tokio::test]
    async fn test_fast_mode_caps_transactions() {
        let loader = SnapshotLoader::new(Arc::new(seeded_store().await));

        let fast = loader.load("u-1", true).await.unwrap();
        assert_eq!(fast.transactions.len(), TRANSACTION_LIMIT_FAST);

        let full = loader.load("u-1", false).await.unwrap();
        assert_eq!(full.transactions.len(), 40);
    }

    #[tokio::test]
    async fn test_transactions_ordered_newest_first() {
        let loader = SnapshotLoader::new(Arc::new(seeded_store().await));

        let snapshot = loader.load("u-1", false).await.unwrap();
        let times: Vec<_> = snapshot
            .transactions
            .iter()
            .map(|t| t.occurred_at)
            .collect();
        let mut sorted = times.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(times, sorted);
    }

    #[tokio::test]
    async fn test_secondary_failures_degrade_to_empty() {
        let store = FailingSecondaryStore {
            inner: seeded_store().await,
        };
        let loader = SnapshotLoader::new(Arc::new(store));

        let snapshot = loader.load("u-1", false).await.unwrap();
        assert_eq!(snapshot.accounts.len(), 2);
        assert!(snapshot.cards.is_empty());
        assert!(snapshot.loans.is_empty());
        assert!(snapshot.transactions.is_empty());
    }
}
