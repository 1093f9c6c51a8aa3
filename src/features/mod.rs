//! Feature extraction for gambling-transaction classification
//!
//! Converts a raw transaction plus historical context into the fixed-length
//! vector the classifier was trained on. Extraction is a deterministic pure
//! function of its inputs; every component is clamped to its documented
//! range so schema drift or bad aggregates can never propagate NaN/Inf into
//! the model.

pub mod context;

pub use context::{ContextProvider, HistoricalContext, MemoryContextProvider, NeutralContextProvider};

use crate::types::Transaction;
use chrono::{Datelike, Timelike};
use std::f64::consts::TAU;

/// Total vector length expected by the classifier input layer.
pub const FEATURE_COUNT: usize = 122;

/// Band layout: (offset, length) pairs. Positions past the last band are
/// zero-filled so the input contract stays stable across schema evolution.
pub const AMOUNT_BAND: (usize, usize) = (0, 5);
pub const TIME_BAND: (usize, usize) = (5, 12);
pub const MERCHANT_BAND: (usize, usize) = (17, 5);
pub const SEQUENCE_BAND: (usize, usize) = (22, 6);
pub const HISTORICAL_BAND: (usize, usize) = (28, 8);
pub const CONTEXT_BAND: (usize, usize) = (36, 4);
pub const PATTERN_BAND: (usize, usize) = (40, 2);

/// Fixed-length, bounds-checked classifier input.
///
/// Z-score components live in [-3, 3]; ratios and flags in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    fn new(values: [f32; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub const fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

    fn band(&self, (offset, len): (usize, usize)) -> &[f32] {
        &self.values[offset..offset + len]
    }

    pub fn amount_band(&self) -> &[f32] {
        self.band(AMOUNT_BAND)
    }

    pub fn time_band(&self) -> &[f32] {
        self.band(TIME_BAND)
    }

    pub fn merchant_band(&self) -> &[f32] {
        self.band(MERCHANT_BAND)
    }

    pub fn sequence_band(&self) -> &[f32] {
        self.band(SEQUENCE_BAND)
    }

    pub fn historical_band(&self) -> &[f32] {
        self.band(HISTORICAL_BAND)
    }

    pub fn context_band(&self) -> &[f32] {
        self.band(CONTEXT_BAND)
    }

    pub fn pattern_band(&self) -> &[f32] {
        self.band(PATTERN_BAND)
    }
}

/// Merchant categories on the ordinal scale used by the merchant band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerchantCategory {
    Groceries,
    Utilities,
    Transport,
    Dining,
    Entertainment,
    Alcohol,
    Atm,
    Gambling,
    Other,
}

impl MerchantCategory {
    const COUNT: usize = 9;

    /// Keyword classification over the payee description and raw text.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();

        if is_known_gambling_venue(&text) {
            return MerchantCategory::Gambling;
        }
        if contains_any(&text, &["atm", "cash withdrawal", "cash out"]) {
            return MerchantCategory::Atm;
        }
        if contains_any(&text, &["bottle shop", "liquor", "bws", "dan murphy", "cellarbrations"]) {
            return MerchantCategory::Alcohol;
        }
        if contains_any(&text, &["hotel", "tavern", "bar ", "pub ", "brewery", "nightclub"]) {
            return MerchantCategory::Entertainment;
        }
        if contains_any(&text, &["woolworths", "coles", "aldi", "iga", "grocer", "supermarket"]) {
            return MerchantCategory::Groceries;
        }
        if contains_any(&text, &["restaurant", "cafe", "coffee", "mcdonald", "kfc", "uber eats"]) {
            return MerchantCategory::Dining;
        }
        if contains_any(&text, &["uber", "taxi", "fuel", "petrol", "opal", "myki", "translink"]) {
            return MerchantCategory::Transport;
        }
        if contains_any(&text, &["energy", "telstra", "optus", "water", "council", "insurance"]) {
            return MerchantCategory::Utilities;
        }

        MerchantCategory::Other
    }

    pub fn ordinal(self) -> usize {
        match self {
            MerchantCategory::Groceries => 0,
            MerchantCategory::Utilities => 1,
            MerchantCategory::Transport => 2,
            MerchantCategory::Dining => 3,
            MerchantCategory::Entertainment => 4,
            MerchantCategory::Alcohol => 5,
            MerchantCategory::Atm => 6,
            MerchantCategory::Gambling => 7,
            MerchantCategory::Other => 8,
        }
    }

    /// Category-level gambling risk prior in [0, 1].
    pub fn risk(self) -> f64 {
        match self {
            MerchantCategory::Gambling => 1.0,
            MerchantCategory::Atm => 0.6,
            MerchantCategory::Alcohol => 0.5,
            MerchantCategory::Entertainment => 0.35,
            MerchantCategory::Other => 0.2,
            MerchantCategory::Dining => 0.1,
            MerchantCategory::Transport => 0.05,
            MerchantCategory::Utilities => 0.05,
            MerchantCategory::Groceries => 0.05,
        }
    }
}

const GAMBLING_KEYWORDS: &[&str] = &[
    "sportsbet",
    "bet365",
    "ladbrokes",
    "pointsbet",
    "betfair",
    "unibet",
    "neds",
    "tabcorp",
    "tab ",
    "casino",
    "pokies",
    "poker",
    "lotto",
    "lottery",
    "keno",
    "bingo",
    "wager",
];

/// Case-insensitive match against the known gambling venue list.
pub fn is_known_gambling_venue(text: &str) -> bool {
    let text = text.to_lowercase();
    contains_any(&text, GAMBLING_KEYWORDS)
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Feature extractor that transforms a transaction and its historical
/// context into the 122-entry model input.
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Extract the full feature vector. Never fails; missing context fields
    /// take their documented neutral defaults.
    pub fn extract(&self, tx: &Transaction, ctx: &HistoricalContext) -> FeatureVector {
        let mut values = [0.0_f32; FEATURE_COUNT];

        self.amount_features(tx, ctx, &mut values);
        self.time_features(tx, &mut values);
        self.merchant_features(tx, ctx, &mut values);
        self.sequence_features(ctx, &mut values);
        self.historical_features(ctx, &mut values);
        self.context_features(tx, ctx, &mut values);
        self.pattern_features(ctx, &mut values);

        FeatureVector::new(values)
    }

    fn amount_features(&self, tx: &Transaction, ctx: &HistoricalContext, out: &mut [f32]) {
        let amount = tx.amount_minor.unsigned_abs() as f64;
        let base = AMOUNT_BAND.0;

        // Standardized against the rolling population profile
        out[base] = zscore(amount, ctx.population_mean_minor, ctx.population_std_minor);

        // Percentile rank within the account's own history
        out[base + 1] = clamp01(percentile_rank(&ctx.recent_amounts_minor, amount));

        // Z-score against the account's own mean/std
        let (mean, std) = mean_std(&ctx.recent_amounts_minor);
        out[base + 2] = zscore(amount, mean, std);

        out[base + 3] = flag(!ctx.recent_amounts_minor.is_empty() && amount > mean);
        out[base + 4] = flag(is_round_amount(tx.amount_minor));
    }

    fn time_features(&self, tx: &Transaction, out: &mut [f32]) {
        let at = tx.posted_at;
        let hour = at.hour() as f64;
        let dow = at.weekday().num_days_from_monday() as f64;
        let dom = at.day();
        let month = at.month() as f64;
        let base = TIME_BAND.0;

        // Linear fractions plus sine/cosine so cyclical adjacency survives
        // (23:00 and 00:00 are close on the circle, far on the line)
        out[base] = clamp01(hour / 23.0);
        out[base + 1] = (TAU * hour / 24.0).sin() as f32;
        out[base + 2] = (TAU * hour / 24.0).cos() as f32;
        out[base + 3] = clamp01(dow / 6.0);
        out[base + 4] = (TAU * dow / 7.0).sin() as f32;
        out[base + 5] = (TAU * dow / 7.0).cos() as f32;
        out[base + 6] = clamp01((dom as f64 - 1.0) / 30.0);
        out[base + 7] = clamp01((month - 1.0) / 11.0);

        out[base + 8] = flag(dow >= 5.0);
        // Payday window: month-end rollover plus mid-month pay cycles
        out[base + 9] = flag(dom >= 27 || dom <= 2 || dom == 14 || dom == 15);
        out[base + 10] = flag(hour >= 22.0 || hour < 4.0);
        out[base + 11] = flag((4.0..7.0).contains(&hour));
    }

    fn merchant_features(&self, tx: &Transaction, ctx: &HistoricalContext, out: &mut [f32]) {
        let text = format!("{} {}", tx.payee, tx.raw_text);
        let category = MerchantCategory::classify(&text);
        let known_venue = is_known_gambling_venue(&text);
        let base = MERCHANT_BAND.0;

        out[base] = clamp01(category.ordinal() as f64 / (MerchantCategory::COUNT - 1) as f64);
        out[base + 1] = clamp01(if known_venue { 1.0 } else { category.risk() });
        out[base + 2] = clamp01(if ctx.total_transactions > 0 {
            ctx.merchant_visits as f64 / ctx.total_transactions as f64
        } else {
            0.0
        });
        out[base + 3] = flag(ctx.merchant_visits == 0);
        out[base + 4] = flag(known_venue);
    }

    fn sequence_features(&self, ctx: &HistoricalContext, out: &mut [f32]) {
        let base = SEQUENCE_BAND.0;

        // Recency capped at one hour; no prior transaction reads as maximal
        let minutes = ctx.minutes_since_last_transaction.unwrap_or(60.0);
        out[base] = clamp01(minutes.min(60.0) / 60.0);

        out[base + 1] = clamp01(ctx.transactions_last_hour as f64 / 10.0);
        out[base + 2] = clamp01(ctx.transactions_last_day as f64 / 50.0);
        out[base + 3] = flag(ctx.recent_atm_withdrawal);
        out[base + 4] = flag(ctx.recent_drinking_venue);
        out[base + 5] = flag(ctx.transactions_last_ten_minutes >= 3);
    }

    fn historical_features(&self, ctx: &HistoricalContext, out: &mut [f32]) {
        let base = HISTORICAL_BAND.0;

        out[base] = clamp01(ctx.gambling_transaction_count as f64 / 100.0);
        // No gambling on record reads as the maximal distance
        out[base + 1] = clamp01(ctx.days_since_last_gambling.unwrap_or(365.0) / 365.0);
        out[base + 2] = clamp01(ctx.current_clean_streak_days / 365.0);
        out[base + 3] = clamp01(ctx.longest_clean_streak_days / 365.0);
        out[base + 4] = clamp01(ctx.relapse_count as f64 / 20.0);
        out[base + 5] = clamp01(ctx.avg_relapse_interval_days / 180.0);
        out[base + 6] = clamp01(ctx.pattern_strength);
        out[base + 7] = clamp01(
            ctx.primary_historical_trigger
                .map(|t| t.index() as f64 / 7.0)
                .unwrap_or(0.0),
        );
    }

    fn context_features(&self, tx: &Transaction, ctx: &HistoricalContext, out: &mut [f32]) {
        let base = CONTEXT_BAND.0;

        // Balance normalized against a $10k ceiling; negative reads as zero
        let balance = tx.balance_minor.unwrap_or(0).max(0) as f64;
        out[base] = clamp01(balance / 1_000_000.0);

        out[base + 1] = flag(ctx.active_commitment);
        out[base + 2] = clamp01(if ctx.commitment_length_days > 0 {
            ctx.commitment_day as f64 / ctx.commitment_length_days as f64
        } else {
            0.0
        });
        out[base + 3] = flag(ctx.has_guardian);
    }

    fn pattern_features(&self, ctx: &HistoricalContext, out: &mut [f32]) {
        let base = PATTERN_BAND.0;
        out[base] = clamp01(ctx.pattern_similarity);
        out[base + 1] = clamp01(ctx.cohort_similarity);
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp01(v: f64) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

fn zscore(value: f64, mean: f64, std: f64) -> f32 {
    if std <= f64::EPSILON || !std.is_finite() {
        return 0.0;
    }
    let z = (value - mean) / std;
    if z.is_finite() {
        z.clamp(-3.0, 3.0) as f32
    } else {
        0.0
    }
}

fn flag(set: bool) -> f32 {
    if set {
        1.0
    } else {
        0.0
    }
}

/// Fraction of history at or below the given amount; 0.5 with no history.
fn percentile_rank(history: &[i64], amount: f64) -> f64 {
    if history.is_empty() {
        return 0.5;
    }
    let below = history
        .iter()
        .filter(|&&h| (h.unsigned_abs() as f64) <= amount)
        .count();
    below as f64 / history.len() as f64
}

fn mean_std(history: &[i64]) -> (f64, f64) {
    if history.is_empty() {
        return (0.0, 0.0);
    }
    let values: Vec<f64> = history.iter().map(|h| h.unsigned_abs() as f64).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

/// Whole major-unit amounts divisible by 10 or 50.
fn is_round_amount(amount_minor: i64) -> bool {
    let minor = amount_minor.unsigned_abs();
    if minor == 0 || minor % 100 != 0 {
        return false;
    }
    let major = minor / 100;
    major % 10 == 0 || major % 50 == 0
}
