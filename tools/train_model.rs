//! Model Training Tool
//!
//! Synthesizes labeled transaction exemplars across the four heads, trains
//! the multi-head network, and publishes the bundle to the configured model
//! path for the service to load at startup.

use chrono::{TimeZone, Utc};
use gamble_guard::features::{FeatureExtractor, HistoricalContext};
use gamble_guard::model::{LabeledExample, RiskClassifier, TrainOptions};
use gamble_guard::types::{GamblingType, Transaction, Trigger};
use rand::Rng;
use tracing::info;

const SPORTS_VENUES: &[&str] = &["Sportsbet", "Bet365", "PointsBet", "Ladbrokes", "TAB 4217"];
const CASINO_VENUES: &[&str] = &["Crown Casino", "Star Casino Online", "Spin Casino"];
const POKER_VENUES: &[&str] = &["PokerStars", "Poker Room Sydney"];
const LOTTERY_VENUES: &[&str] = &["Oz Lotto", "Lottery West", "Keno Club"];
const BENIGN_MERCHANTS: &[&str] = &[
    "Woolworths",
    "Coles Express",
    "Uber Eats",
    "Telstra",
    "Cafe Luna",
    "Kmart",
    "Opal Top Up",
];

/// Exemplar generator covering all four prediction heads
struct ExampleGenerator {
    rng: rand::rngs::ThreadRng,
    extractor: FeatureExtractor,
}

impl ExampleGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            extractor: FeatureExtractor::new(),
        }
    }

    fn generate(&mut self, gambling: bool) -> LabeledExample {
        let (payee, gambling_type) = if gambling {
            match self.rng.gen_range(0..4) {
                0 => (self.choice(SPORTS_VENUES), Some(GamblingType::SportsBetting)),
                1 => (self.choice(CASINO_VENUES), Some(GamblingType::OnlineCasino)),
                2 => (self.choice(POKER_VENUES), Some(GamblingType::Poker)),
                _ => (self.choice(LOTTERY_VENUES), Some(GamblingType::Lottery)),
            }
        } else {
            (self.choice(BENIGN_MERCHANTS), None)
        };

        // Gambling exemplars skew late-night, payday, and round amounts
        let hour = if gambling && self.rng.gen_bool(0.6) {
            22 + self.rng.gen_range(0..2)
        } else {
            self.rng.gen_range(8..21)
        };
        let day = if gambling && self.rng.gen_bool(0.5) {
            [14, 15, 27, 28][self.rng.gen_range(0..4)]
        } else {
            self.rng.gen_range(3..26)
        };
        let amount_major: i64 = if gambling {
            [20, 50, 100, 150, 200][self.rng.gen_range(0..5)]
        } else {
            self.rng.gen_range(4..120)
        };

        let transaction = Transaction {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            amount_minor: -amount_major * 100,
            payee: payee.to_string(),
            raw_text: payee.to_string(),
            posted_at: Utc
                .with_ymd_and_hms(2024, self.rng.gen_range(1..=12), day, hour, 0, 0)
                .unwrap(),
            balance_minor: Some(self.rng.gen_range(5_000..400_000)),
        };

        let context = self.context_for(gambling);
        let trigger = self.trigger_for(&transaction, &context, gambling);
        let relapse_risk = if gambling {
            (0.4 + 0.5 * context.pattern_strength as f32).min(1.0)
        } else {
            self.rng.gen_range(0.0..0.2)
        };

        LabeledExample {
            features: self.extractor.extract(&transaction, &context),
            is_gambling: gambling,
            gambling_type,
            trigger,
            relapse_risk,
        }
    }

    fn context_for(&mut self, gambling: bool) -> HistoricalContext {
        let mut context = HistoricalContext {
            recent_amounts_minor: (0..20)
                .map(|_| self.rng.gen_range(500..20_000))
                .collect(),
            total_transactions: self.rng.gen_range(50..2000),
            transactions_last_hour: self.rng.gen_range(0..4),
            transactions_last_day: self.rng.gen_range(1..15),
            minutes_since_last_transaction: Some(self.rng.gen_range(1.0..240.0)),
            has_guardian: self.rng.gen_bool(0.5),
            ..Default::default()
        };

        if gambling {
            context.gambling_transaction_count = self.rng.gen_range(5..80);
            context.days_since_last_gambling = Some(self.rng.gen_range(0.0..30.0));
            context.relapse_count = self.rng.gen_range(1..10);
            context.pattern_strength = self.rng.gen_range(0.4..1.0);
            context.pattern_similarity = self.rng.gen_range(0.5..1.0);
            context.recent_drinking_venue = self.rng.gen_bool(0.3);
            context.recent_atm_withdrawal = self.rng.gen_bool(0.3);
        } else {
            context.gambling_transaction_count = self.rng.gen_range(0..3);
            context.days_since_last_gambling = Some(self.rng.gen_range(60.0..365.0));
            context.current_clean_streak_days = self.rng.gen_range(30.0..300.0);
            context.pattern_strength = self.rng.gen_range(0.0..0.2);
        }

        context
    }

    fn trigger_for(
        &mut self,
        transaction: &Transaction,
        context: &HistoricalContext,
        gambling: bool,
    ) -> Trigger {
        use chrono::{Datelike, Timelike};

        let hour = transaction.posted_at.hour();
        let dom = transaction.posted_at.day();
        let weekend = transaction.posted_at.weekday().num_days_from_monday() >= 5;

        if gambling && context.recent_drinking_venue {
            Trigger::AlcoholRelated
        } else if hour >= 22 || hour < 4 {
            Trigger::LateNight
        } else if dom >= 27 || dom <= 2 || dom == 14 || dom == 15 {
            Trigger::Payday
        } else if weekend {
            Trigger::Weekend
        } else {
            [
                Trigger::Stress,
                Trigger::SocialPressure,
                Trigger::Boredom,
                Trigger::LossChasing,
            ][self.rng.gen_range(0..4)]
        }
    }

    fn choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("train_model=info".parse()?)
                .add_directive("gamble_guard=info".parse()?),
        )
        .init();

    info!("Starting model training tool");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let model_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("models/gambling_model.json");
    let examples_per_class: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(500);
    let epochs: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(50);

    info!(
        model_path = %model_path,
        examples_per_class = examples_per_class,
        epochs = epochs,
        "Configuration loaded"
    );

    let mut generator = ExampleGenerator::new();
    let mut examples = Vec::with_capacity(examples_per_class * 2);
    for _ in 0..examples_per_class {
        examples.push(generator.generate(true));
        examples.push(generator.generate(false));
    }
    info!("Generated {} labeled examples", examples.len());

    let classifier = RiskClassifier::from_path(model_path);
    let options = TrainOptions {
        epochs,
        batch_size: 32,
        validation_fraction: 0.2,
        learning_rate: 0.05,
        seed: None,
    };

    let history = classifier.train(&examples, &options)?;

    for stats in history.epochs.iter().step_by(10.max(epochs / 10)) {
        info!(
            epoch = stats.epoch,
            train_loss = stats.train_loss,
            validation_loss = ?stats.validation_loss,
            validation_accuracy = ?stats.validation_accuracy,
            "Training progress"
        );
    }

    let report = classifier.evaluate(&examples)?;
    info!(
        loss = report.loss,
        accuracy = report.accuracy,
        "Final evaluation"
    );

    let info = classifier.model_info();
    info!(
        version = %info.version,
        architecture = %info.architecture,
        "Model bundle published to {}",
        model_path
    );

    Ok(())
}
