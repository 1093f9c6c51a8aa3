//! Historical context supplied by the aggregation collaborator
//!
//! Every field has a documented neutral default so a sparse or missing
//! context never fails feature extraction.

use crate::types::{Transaction, Trigger};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Rolling aggregates and behavioral history for the account under watch.
///
/// Amounts are absolute values in currency minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalContext {
    /// Rolling population mean transaction amount
    pub population_mean_minor: f64,
    /// Rolling population standard deviation
    pub population_std_minor: f64,
    /// Recent transaction amounts for this account, most recent last
    pub recent_amounts_minor: Vec<i64>,

    /// Prior transactions at the current payee
    pub merchant_visits: u32,
    /// Lifetime transaction count for the account
    pub total_transactions: u32,

    /// Minutes since the previous transaction, if any
    pub minutes_since_last_transaction: Option<f64>,
    pub transactions_last_ten_minutes: u32,
    pub transactions_last_hour: u32,
    pub transactions_last_day: u32,
    pub recent_atm_withdrawal: bool,
    pub recent_drinking_venue: bool,

    /// Lifetime count of detected gambling transactions
    pub gambling_transaction_count: u32,
    /// Days since the last gambling event; `None` means none on record
    pub days_since_last_gambling: Option<f64>,
    pub current_clean_streak_days: f64,
    pub longest_clean_streak_days: f64,
    pub relapse_count: u32,
    pub avg_relapse_interval_days: f64,
    /// Learned pattern-strength score in [0, 1]
    pub pattern_strength: f64,
    /// Dominant trigger observed in past gambling events
    pub primary_historical_trigger: Option<Trigger>,

    pub active_commitment: bool,
    /// Days elapsed inside the active commitment period
    pub commitment_day: u32,
    pub commitment_length_days: u32,
    pub has_guardian: bool,

    /// Similarity to this account's own historical gambling patterns, [0, 1]
    pub pattern_similarity: f64,
    /// Similarity to cross-user behavioral clusters, [0, 1]
    pub cohort_similarity: f64,
}

impl Default for HistoricalContext {
    fn default() -> Self {
        Self {
            // Neutral population profile: mean $85, std $120
            population_mean_minor: 8_500.0,
            population_std_minor: 12_000.0,
            recent_amounts_minor: Vec::new(),
            merchant_visits: 0,
            total_transactions: 0,
            minutes_since_last_transaction: None,
            transactions_last_ten_minutes: 0,
            transactions_last_hour: 0,
            transactions_last_day: 0,
            recent_atm_withdrawal: false,
            recent_drinking_venue: false,
            gambling_transaction_count: 0,
            days_since_last_gambling: None,
            current_clean_streak_days: 0.0,
            longest_clean_streak_days: 0.0,
            relapse_count: 0,
            avg_relapse_interval_days: 0.0,
            pattern_strength: 0.0,
            primary_historical_trigger: None,
            active_commitment: false,
            commitment_day: 0,
            commitment_length_days: 0,
            has_guardian: false,
            pattern_similarity: 0.0,
            cohort_similarity: 0.0,
        }
    }
}

/// Source of historical context for a transaction.
///
/// The durable aggregation service is an external collaborator; the pipeline
/// only depends on this trait.
pub trait ContextProvider: Send + Sync {
    fn context_for(&self, transaction: &Transaction) -> HistoricalContext;
}

/// Provider that always returns the neutral default context.
#[derive(Debug, Default)]
pub struct NeutralContextProvider;

impl ContextProvider for NeutralContextProvider {
    fn context_for(&self, _transaction: &Transaction) -> HistoricalContext {
        HistoricalContext::default()
    }
}

/// In-memory provider holding one account profile, keyed merchant counts
/// filled in per transaction. Used in tests and the training tool.
#[derive(Debug, Default)]
pub struct MemoryContextProvider {
    base: RwLock<HistoricalContext>,
    merchant_counts: RwLock<HashMap<String, u32>>,
}

impl MemoryContextProvider {
    pub fn new(base: HistoricalContext) -> Self {
        Self {
            base: RwLock::new(base),
            merchant_counts: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_context(&self, context: HistoricalContext) {
        if let Ok(mut base) = self.base.write() {
            *base = context;
        }
    }

    pub fn record_merchant_visit(&self, payee: &str) {
        if let Ok(mut counts) = self.merchant_counts.write() {
            *counts.entry(payee.to_lowercase()).or_insert(0) += 1;
        }
    }
}

impl ContextProvider for MemoryContextProvider {
    fn context_for(&self, transaction: &Transaction) -> HistoricalContext {
        let mut context = self
            .base
            .read()
            .map(|c| c.clone())
            .unwrap_or_default();

        if let Ok(counts) = self.merchant_counts.read() {
            context.merchant_visits = counts
                .get(&transaction.payee.to_lowercase())
                .copied()
                .unwrap_or(0);
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn transaction(payee: &str) -> Transaction {
        Transaction {
            transaction_id: "tx_ctx".to_string(),
            amount_minor: -5000,
            payee: payee.to_string(),
            raw_text: payee.to_string(),
            posted_at: Utc::now(),
            balance_minor: None,
        }
    }

    #[test]
    fn test_sparse_context_deserializes_with_defaults() {
        let context: HistoricalContext = serde_json::from_str("{}").unwrap();
        assert_eq!(context.total_transactions, 0);
        assert!(context.days_since_last_gambling.is_none());
        assert!(context.population_std_minor > 0.0);
    }

    #[test]
    fn test_memory_provider_merchant_counts() {
        let provider = MemoryContextProvider::default();
        provider.record_merchant_visit("Sportsbet");
        provider.record_merchant_visit("sportsbet");

        let context = provider.context_for(&transaction("SPORTSBET"));
        assert_eq!(context.merchant_visits, 2);

        let context = provider.context_for(&transaction("Woolworths"));
        assert_eq!(context.merchant_visits, 0);
    }
}
