//! Performance metrics and statistics tracking for the detection pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance and outcomes
pub struct PipelineMetrics {
    /// Total transactions processed
    pub transactions_processed: AtomicU64,
    /// Total alerts generated
    pub alerts_generated: AtomicU64,
    /// Duplicate deliveries skipped at the idempotency gate
    pub duplicates_skipped: AtomicU64,
    /// Requests rejected for a missing or invalid signature
    pub signature_rejections: AtomicU64,
    /// Transactions resolved via the whitelist
    pub whitelisted_skips: AtomicU64,
    /// Classifications that failed and fell back to a fail-safe alert
    pub inference_failures: AtomicU64,
    /// Alerts by decision rationale
    alerts_by_rationale: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Gambling-confidence distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            transactions_processed: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            signature_rejections: AtomicU64::new(0),
            whitelisted_skips: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            alerts_by_rationale: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a processed transaction
    pub fn record_transaction(&self, processing_time: Duration, gambling_confidence: f64) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (gambling_confidence * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record an alert
    pub fn record_alert(&self, rationale: &str) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_rationale) = self.alerts_by_rationale.write() {
            *by_rationale.entry(rationale.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signature_rejection(&self) {
        self.signature_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_whitelisted(&self) {
        self.whitelisted_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get gambling-confidence distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get alerts by decision rationale
    pub fn get_alerts_by_rationale(&self) -> HashMap<String, u64> {
        self.alerts_by_rationale
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let tx_count = self.transactions_processed.load(Ordering::Relaxed);
        let alert_count = self.alerts_generated.load(Ordering::Relaxed);
        let alert_rate = if tx_count > 0 {
            (alert_count as f64 / tx_count as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();

        info!("==================== pipeline metrics ====================");
        info!(
            "transactions={} throughput={:.1} tx/s alerts={} ({:.1}%)",
            tx_count, throughput, alert_count, alert_rate
        );
        info!(
            "duplicates={} whitelisted={} signature_rejections={} inference_failures={}",
            self.duplicates_skipped.load(Ordering::Relaxed),
            self.whitelisted_skips.load(Ordering::Relaxed),
            self.signature_rejections.load(Ordering::Relaxed),
            self.inference_failures.load(Ordering::Relaxed),
        );
        info!(
            "processing_us: mean={} p50={} p95={} p99={} max={}",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us,
            processing.max_us
        );

        for (rationale, count) in &self.get_alerts_by_rationale() {
            info!("alerts[{}]={}", rationale, count);
        }

        let score_dist = self.get_score_distribution();
        let total: u64 = score_dist.iter().sum();
        if total > 0 {
            for (i, &count) in score_dist.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                info!(
                    "confidence {:.1}-{:.1}: {} ({:.1}%)",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct
                );
            }
        }
        info!("==========================================================");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_transaction(Duration::from_micros(100), 0.5);
        metrics.record_transaction(Duration::from_micros(200), 0.8);
        metrics.record_alert("gambling_detected");
        metrics.record_duplicate();
        metrics.record_signature_rejection();

        assert_eq!(metrics.transactions_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.alerts_generated.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.duplicates_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.signature_rejections.load(Ordering::Relaxed), 1);
        assert_eq!(
            metrics.get_alerts_by_rationale().get("gambling_detected"),
            Some(&1)
        );
    }

    #[test]
    fn test_score_buckets() {
        let metrics = PipelineMetrics::new();

        metrics.record_transaction(Duration::from_micros(100), 0.05);
        metrics.record_transaction(Duration::from_micros(100), 0.95);
        metrics.record_transaction(Duration::from_micros(100), 1.0);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 2);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = PipelineMetrics::new();
        for us in [100u64, 200, 300, 400] {
            metrics.record_transaction(Duration::from_micros(us), 0.5);
        }

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.max_us, 400);
    }
}
