//! Durable persistence contract and the in-memory reference store
//!
//! The relational store is an external collaborator; the pipeline depends
//! only on this trait. Idempotency is enforced at the insert boundary: the
//! transaction id is a unique key, and a concurrent duplicate write is
//! reported as `Duplicate`, never as an error.

use crate::types::{ClassificationResult, InterventionRecord, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Store infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The unique index already held this transaction id
    Duplicate,
}

/// A payee pattern exempted from gambling classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Matched case-insensitively as a substring of the payee
    pub pattern: String,
    pub created_at: DateTime<Utc>,
}

impl WhitelistEntry {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn matches(&self, payee: &str) -> bool {
        payee.to_lowercase().contains(&self.pattern.to_lowercase())
    }
}

/// A transaction with its classification outcome, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub transaction: Transaction,
    pub whitelisted: bool,
    /// Absent when classification was skipped or failed
    pub classification: Option<ClassificationResult>,
    pub stored_at: DateTime<Utc>,
}

/// Durable, idempotent persistence of transactions and decisions.
pub trait TransactionStore: Send + Sync {
    /// Lookup against the unique transaction-id index.
    fn exists(&self, transaction_id: &str) -> Result<bool, StoreError>;

    /// Insert under the uniqueness constraint. A conflicting id yields
    /// `Duplicate`, not an error.
    fn insert(&self, record: StoredTransaction) -> Result<InsertOutcome, StoreError>;

    /// Case-insensitive pattern match against the whitelist relation.
    fn is_whitelisted(&self, payee: &str) -> Result<bool, StoreError>;

    fn add_whitelist_entry(&self, entry: WhitelistEntry) -> Result<(), StoreError>;

    fn record_intervention(&self, record: InterventionRecord) -> Result<(), StoreError>;
}

/// In-memory reference implementation of the store contract.
#[derive(Default)]
pub struct MemoryStore {
    transactions: RwLock<HashMap<String, StoredTransaction>>,
    whitelist: RwLock<Vec<WhitelistEntry>>,
    interventions: RwLock<Vec<InterventionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with whitelist patterns from configuration.
    pub fn with_whitelist<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = Self::new();
        if let Ok(mut whitelist) = store.whitelist.write() {
            whitelist.extend(patterns.into_iter().map(|p| WhitelistEntry::new(p.as_ref())));
        }
        store
    }

    pub fn get(&self, transaction_id: &str) -> Option<StoredTransaction> {
        self.transactions
            .read()
            .ok()
            .and_then(|txs| txs.get(transaction_id).cloned())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn interventions(&self) -> Vec<InterventionRecord> {
        self.interventions
            .read()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    pub fn alert_count(&self) -> usize {
        self.interventions()
            .iter()
            .filter(|r| r.alert)
            .count()
    }
}

impl TransactionStore for MemoryStore {
    fn exists(&self, transaction_id: &str) -> Result<bool, StoreError> {
        let transactions = self
            .transactions
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(transactions.contains_key(transaction_id))
    }

    fn insert(&self, record: StoredTransaction) -> Result<InsertOutcome, StoreError> {
        let mut transactions = self
            .transactions
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let key = record.transaction.transaction_id.clone();
        if transactions.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        transactions.insert(key, record);
        Ok(InsertOutcome::Inserted)
    }

    fn is_whitelisted(&self, payee: &str) -> Result<bool, StoreError> {
        let whitelist = self
            .whitelist
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(whitelist.iter().any(|entry| entry.matches(payee)))
    }

    fn add_whitelist_entry(&self, entry: WhitelistEntry) -> Result<(), StoreError> {
        let mut whitelist = self
            .whitelist
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        whitelist.push(entry);
        Ok(())
    }

    fn record_intervention(&self, record: InterventionRecord) -> Result<(), StoreError> {
        let mut interventions = self
            .interventions
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        interventions.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(id: &str) -> StoredTransaction {
        StoredTransaction {
            transaction: Transaction {
                transaction_id: id.to_string(),
                amount_minor: -5000,
                payee: "Sportsbet".to_string(),
                raw_text: "Sportsbet".to_string(),
                posted_at: Utc::now(),
                balance_minor: None,
            },
            whitelisted: false,
            classification: None,
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = MemoryStore::new();

        assert_eq!(store.insert(stored("tx_1")).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(stored("tx_1")).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.transaction_count(), 1);
        assert!(store.exists("tx_1").unwrap());
        assert!(!store.exists("tx_2").unwrap());
    }

    #[test]
    fn test_whitelist_matches_case_insensitive_substring() {
        let store = MemoryStore::with_whitelist(["Woolworths"]);

        assert!(store.is_whitelisted("WOOLWORTHS METRO SYDNEY").unwrap());
        assert!(store.is_whitelisted("woolworths").unwrap());
        assert!(!store.is_whitelisted("Sportsbet").unwrap());

        store
            .add_whitelist_entry(WhitelistEntry::new("coles"))
            .unwrap();
        assert!(store.is_whitelisted("Coles Express").unwrap());
    }

    #[test]
    fn test_concurrent_duplicate_inserts_store_once() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.insert(stored("tx_race")).unwrap()
            }));
        }

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == InsertOutcome::Inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.transaction_count(), 1);
    }
}
