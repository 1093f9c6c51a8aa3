//! Multi-head feedforward network: shared trunk, four output heads
//!
//! Trunk is four fully-connected ReLU layers (256, 128, 64, 32) with
//! inverted dropout between layers at training time. The final 32-wide
//! representation feeds four independent heads: binary gambling detection
//! (sigmoid), 4-way gambling type (softmax), 8-way trigger (softmax), and a
//! bounded relapse-risk regression (sigmoid). Inference applies no dropout
//! and mutates nothing, so a fixed model state always produces the same
//! output for the same input.

use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::model::ModelError;
use crate::types::{GamblingType, Trigger};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Width of each trunk layer, input first.
pub const TRUNK_WIDTHS: [usize; 4] = [256, 128, 64, 32];

/// Classes on the gambling-type head.
pub const TYPE_CLASSES: usize = 4;

/// Classes on the trigger head.
pub const TRIGGER_CLASSES: usize = 8;

const DEFAULT_DROPOUT: f32 = 0.2;
const PROB_FLOOR: f32 = 1e-7;

/// One labeled training example for all four heads.
#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub is_gambling: bool,
    /// Type label only applies to gambling-positive examples
    pub gambling_type: Option<GamblingType>,
    pub trigger: Trigger,
    /// Target for the relapse-risk head, in [0, 1]
    pub relapse_risk: f32,
}

/// Supervised training options.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of examples held out for per-epoch validation
    pub validation_fraction: f64,
    pub learning_rate: f32,
    /// Fixed seed makes shuffling, the split, and dropout reproducible
    pub seed: Option<u64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 30,
            batch_size: 16,
            validation_fraction: 0.2,
            learning_rate: 0.05,
            seed: None,
        }
    }
}

/// Per-epoch training statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub validation_accuracy: Option<f64>,
}

/// Full history of one training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochStats>,
}

/// Offline evaluation result: combined loss and gambling-head accuracy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalReport {
    pub loss: f64,
    pub accuracy: f64,
}

/// Raw head outputs of one forward pass.
#[derive(Debug, Clone)]
pub struct HeadOutputs {
    /// Sigmoid gambling probability
    pub gambling: f32,
    /// Normalized 4-way type distribution
    pub type_probs: Array1<f32>,
    /// Normalized 8-way trigger distribution
    pub trigger_probs: Array1<f32>,
    /// Bounded relapse-risk score
    pub relapse: f32,
}

/// One fully-connected layer, weights stored (out, in).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    fn new(input: usize, output: usize, rng: &mut StdRng) -> Self {
        // He-uniform initialization
        let limit = (6.0 / input as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((output, input), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(output),
        }
    }

    fn forward(&self, x: &Array1<f32>) -> Array1<f32> {
        self.weights.dot(x) + &self.bias
    }
}

/// Gradient accumulator shaped like a `Dense` layer.
struct DenseGrad {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseGrad {
    fn zeros_like(layer: &Dense) -> Self {
        Self {
            weights: Array2::zeros(layer.weights.raw_dim()),
            bias: Array1::zeros(layer.bias.raw_dim()),
        }
    }

    /// dW += dz ⊗ input, db += dz
    fn accumulate(&mut self, dz: &Array1<f32>, input: &Array1<f32>) {
        let outer = dz
            .view()
            .insert_axis(Axis(1))
            .dot(&input.view().insert_axis(Axis(0)));
        self.weights += &outer;
        self.bias += dz;
    }
}

struct NetworkGrads {
    trunk: Vec<DenseGrad>,
    gambling: DenseGrad,
    gambling_type: DenseGrad,
    trigger: DenseGrad,
    relapse: DenseGrad,
}

/// Per-layer forward cache kept for backpropagation.
struct TrunkCache {
    /// Input the layer saw (post-dropout activation of the previous layer)
    input: Array1<f32>,
    /// Pre-activation
    z: Array1<f32>,
    /// Inverted-dropout mask, if one was applied to this layer's output
    mask: Option<Array1<f32>>,
}

/// The multi-head classification network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiHeadNetwork {
    trunk: Vec<Dense>,
    gambling_head: Dense,
    type_head: Dense,
    trigger_head: Dense,
    relapse_head: Dense,
    dropout: f32,
}

impl MultiHeadNetwork {
    /// Freshly-initialized network with reproducible weights.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut trunk = Vec::with_capacity(TRUNK_WIDTHS.len());
        let mut fan_in = FEATURE_COUNT;
        for width in TRUNK_WIDTHS {
            trunk.push(Dense::new(fan_in, width, &mut rng));
            fan_in = width;
        }

        let final_width = *TRUNK_WIDTHS.last().unwrap_or(&32);
        Self {
            trunk,
            gambling_head: Dense::new(final_width, 1, &mut rng),
            type_head: Dense::new(final_width, TYPE_CLASSES, &mut rng),
            trigger_head: Dense::new(final_width, TRIGGER_CLASSES, &mut rng),
            relapse_head: Dense::new(final_width, 1, &mut rng),
            dropout: DEFAULT_DROPOUT,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.trunk
            .first()
            .map(|l| l.weights.ncols())
            .unwrap_or(FEATURE_COUNT)
    }

    /// Layer widths, input first: `[122, 256, 128, 64, 32]`.
    pub fn architecture(&self) -> Vec<usize> {
        let mut dims = vec![self.input_dim()];
        dims.extend(self.trunk.iter().map(|l| l.weights.nrows()));
        dims
    }

    /// Inference forward pass. No dropout, no mutation.
    pub fn forward(&self, x: &Array1<f32>) -> HeadOutputs {
        let mut a = x.clone();
        for layer in &self.trunk {
            a = relu(&layer.forward(&a));
        }

        HeadOutputs {
            gambling: sigmoid(self.gambling_head.forward(&a)[0]),
            type_probs: softmax(&self.type_head.forward(&a)),
            trigger_probs: softmax(&self.trigger_head.forward(&a)),
            relapse: sigmoid(self.relapse_head.forward(&a)[0]),
        }
    }

    pub fn predict_vector(&self, features: &FeatureVector) -> Result<HeadOutputs, ModelError> {
        if features.len() != self.input_dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim(),
                got: features.len(),
            });
        }
        let x = Array1::from_iter(features.as_slice().iter().copied());
        Ok(self.forward(&x))
    }

    /// Supervised fit against the four head losses simultaneously:
    /// binary cross-entropy, two categorical cross-entropies, and MSE.
    pub fn train(
        &mut self,
        examples: &[LabeledExample],
        options: &TrainOptions,
    ) -> Result<TrainingHistory, ModelError> {
        if examples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        self.check_dims(examples)?;

        let mut rng = StdRng::seed_from_u64(options.seed.unwrap_or(0x6a6d_6c31));

        let mut indices: Vec<usize> = (0..examples.len()).collect();
        indices.shuffle(&mut rng);

        let holdout = ((examples.len() as f64) * options.validation_fraction) as usize;
        let holdout = holdout.min(examples.len().saturating_sub(1));
        let (train_idx, val_idx) = indices.split_at(examples.len() - holdout);
        let mut train_idx = train_idx.to_vec();

        let batch_size = options.batch_size.max(1);
        let mut history = TrainingHistory::default();

        for epoch in 0..options.epochs {
            train_idx.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch in train_idx.chunks(batch_size) {
                let mut grads = self.zero_grads();
                for &i in batch {
                    epoch_loss += self.backward(&examples[i], &mut grads, &mut rng);
                }
                self.apply_grads(&grads, options.learning_rate / batch.len() as f32);
            }
            let train_loss = epoch_loss / train_idx.len() as f64;

            let (validation_loss, validation_accuracy) = if val_idx.is_empty() {
                (None, None)
            } else {
                let report = self.evaluate_indices(examples, val_idx);
                (Some(report.loss), Some(report.accuracy))
            };

            history.epochs.push(EpochStats {
                epoch,
                train_loss,
                validation_loss,
                validation_accuracy,
            });
        }

        Ok(history)
    }

    /// Combined loss and gambling-head accuracy over a labeled set.
    pub fn evaluate(&self, examples: &[LabeledExample]) -> Result<EvalReport, ModelError> {
        if examples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        self.check_dims(examples)?;
        let indices: Vec<usize> = (0..examples.len()).collect();
        Ok(self.evaluate_indices(examples, &indices))
    }

    fn check_dims(&self, examples: &[LabeledExample]) -> Result<(), ModelError> {
        let expected = self.input_dim();
        for example in examples {
            if example.features.len() != expected {
                return Err(ModelError::DimensionMismatch {
                    expected,
                    got: example.features.len(),
                });
            }
        }
        Ok(())
    }

    fn evaluate_indices(&self, examples: &[LabeledExample], indices: &[usize]) -> EvalReport {
        let mut loss = 0.0;
        let mut correct = 0usize;

        for &i in indices {
            let example = &examples[i];
            let x = Array1::from_iter(example.features.as_slice().iter().copied());
            let out = self.forward(&x);

            loss += example_loss(&out, example);
            if (out.gambling >= 0.5) == example.is_gambling {
                correct += 1;
            }
        }

        EvalReport {
            loss: loss / indices.len() as f64,
            accuracy: correct as f64 / indices.len() as f64,
        }
    }

    fn zero_grads(&self) -> NetworkGrads {
        NetworkGrads {
            trunk: self.trunk.iter().map(DenseGrad::zeros_like).collect(),
            gambling: DenseGrad::zeros_like(&self.gambling_head),
            gambling_type: DenseGrad::zeros_like(&self.type_head),
            trigger: DenseGrad::zeros_like(&self.trigger_head),
            relapse: DenseGrad::zeros_like(&self.relapse_head),
        }
    }

    /// Forward with caches and dropout, then accumulate gradients for one
    /// example. Returns the example's combined loss.
    fn backward(
        &self,
        example: &LabeledExample,
        grads: &mut NetworkGrads,
        rng: &mut StdRng,
    ) -> f64 {
        let x = Array1::from_iter(example.features.as_slice().iter().copied());

        // Trunk forward, caching inputs, pre-activations, and dropout masks
        let mut caches: Vec<TrunkCache> = Vec::with_capacity(self.trunk.len());
        let mut a = x;
        for (li, layer) in self.trunk.iter().enumerate() {
            let input = a;
            let z = layer.forward(&input);
            let mut activated = relu(&z);

            // Dropout between layers only; the final representation is kept
            let mask = if li + 1 < self.trunk.len() && self.dropout > 0.0 {
                let keep = 1.0 - self.dropout;
                let mask = Array1::from_shape_fn(activated.len(), |_| {
                    if rng.gen::<f32>() < keep {
                        1.0 / keep
                    } else {
                        0.0
                    }
                });
                activated = &activated * &mask;
                Some(mask)
            } else {
                None
            };

            caches.push(TrunkCache { input, z, mask });
            a = activated;
        }
        let representation = a;

        // Heads
        let z_gambling = self.gambling_head.forward(&representation);
        let z_type = self.type_head.forward(&representation);
        let z_trigger = self.trigger_head.forward(&representation);
        let z_relapse = self.relapse_head.forward(&representation);

        let p_gambling = sigmoid(z_gambling[0]);
        let p_type = softmax(&z_type);
        let p_trigger = softmax(&z_trigger);
        let p_relapse = sigmoid(z_relapse[0]);

        let out = HeadOutputs {
            gambling: p_gambling,
            type_probs: p_type.clone(),
            trigger_probs: p_trigger.clone(),
            relapse: p_relapse,
        };
        let loss = example_loss(&out, example);

        // Head gradients at the pre-activations
        let target = if example.is_gambling { 1.0 } else { 0.0 };
        let dz_gambling = Array1::from_elem(1, p_gambling - target);

        let dz_type = match example.gambling_type {
            Some(t) => {
                let mut dz = p_type;
                dz[t.index()] -= 1.0;
                dz
            }
            None => Array1::zeros(TYPE_CLASSES),
        };

        let mut dz_trigger = p_trigger;
        dz_trigger[example.trigger.index()] -= 1.0;

        let relapse_err = p_relapse - example.relapse_risk.clamp(0.0, 1.0);
        let dz_relapse =
            Array1::from_elem(1, 2.0 * relapse_err * p_relapse * (1.0 - p_relapse));

        grads.gambling.accumulate(&dz_gambling, &representation);
        grads.gambling_type.accumulate(&dz_type, &representation);
        grads.trigger.accumulate(&dz_trigger, &representation);
        grads.relapse.accumulate(&dz_relapse, &representation);

        // Backpropagate the summed head gradients through the trunk
        let mut d_activation = self.gambling_head.weights.t().dot(&dz_gambling)
            + self.type_head.weights.t().dot(&dz_type)
            + self.trigger_head.weights.t().dot(&dz_trigger)
            + self.relapse_head.weights.t().dot(&dz_relapse);

        for (layer, grad, cache) in reversed_layers(&self.trunk, &mut grads.trunk, &caches) {
            if let Some(mask) = &cache.mask {
                d_activation = &d_activation * mask;
            }
            let dz = relu_backward(&d_activation, &cache.z);
            grad.accumulate(&dz, &cache.input);
            d_activation = layer.weights.t().dot(&dz);
        }

        loss
    }

    fn apply_grads(&mut self, grads: &NetworkGrads, scale: f32) {
        for (layer, grad) in self.trunk.iter_mut().zip(&grads.trunk) {
            layer.weights.scaled_add(-scale, &grad.weights);
            layer.bias.scaled_add(-scale, &grad.bias);
        }
        for (layer, grad) in [
            (&mut self.gambling_head, &grads.gambling),
            (&mut self.type_head, &grads.gambling_type),
            (&mut self.trigger_head, &grads.trigger),
            (&mut self.relapse_head, &grads.relapse),
        ] {
            layer.weights.scaled_add(-scale, &grad.weights);
            layer.bias.scaled_add(-scale, &grad.bias);
        }
    }
}

/// Iterate trunk layers, their gradient slots, and caches in reverse.
fn reversed_layers<'a>(
    layers: &'a [Dense],
    grads: &'a mut [DenseGrad],
    caches: &'a [TrunkCache],
) -> impl Iterator<Item = (&'a Dense, &'a mut DenseGrad, &'a TrunkCache)> {
    layers
        .iter()
        .zip(grads.iter_mut())
        .zip(caches.iter())
        .map(|((l, g), c)| (l, g, c))
        .rev()
}

fn relu(z: &Array1<f32>) -> Array1<f32> {
    z.mapv(|v| v.max(0.0))
}

fn relu_backward(d_activation: &Array1<f32>, z: &Array1<f32>) -> Array1<f32> {
    Array1::from_shape_fn(z.len(), |i| {
        if z[i] > 0.0 {
            d_activation[i]
        } else {
            0.0
        }
    })
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

fn softmax(z: &Array1<f32>) -> Array1<f32> {
    let max = z.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp = z.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp.mapv(|v| v / sum)
}

fn example_loss(out: &HeadOutputs, example: &LabeledExample) -> f64 {
    let target = if example.is_gambling { 1.0 } else { 0.0 };
    let p = out.gambling.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
    let bce = -(target * p.ln() + (1.0 - target) * (1.0 - p).ln());

    let type_ce = example
        .gambling_type
        .map(|t| -out.type_probs[t.index()].max(PROB_FLOOR).ln())
        .unwrap_or(0.0);

    let trigger_ce = -out.trigger_probs[example.trigger.index()]
        .max(PROB_FLOOR)
        .ln();

    let mse = (out.relapse - example.relapse_risk.clamp(0.0, 1.0)).powi(2);

    (bce + type_ce + trigger_ce + mse) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureExtractor, HistoricalContext};
    use crate::types::Transaction;
    use chrono::{TimeZone, Utc};

    fn vector_for(payee: &str) -> FeatureVector {
        let tx = Transaction {
            transaction_id: "tx_net".to_string(),
            amount_minor: -5000,
            payee: payee.to_string(),
            raw_text: payee.to_string(),
            posted_at: Utc.with_ymd_and_hms(2024, 3, 15, 23, 30, 0).unwrap(),
            balance_minor: Some(80_000),
        };
        FeatureExtractor::new().extract(&tx, &HistoricalContext::default())
    }

    fn separable_examples() -> Vec<LabeledExample> {
        let gambling = vector_for("Sportsbet");
        let grocery = vector_for("Woolworths");

        let mut examples = Vec::new();
        for i in 0..30 {
            examples.push(LabeledExample {
                features: gambling.clone(),
                is_gambling: true,
                gambling_type: Some(GamblingType::SportsBetting),
                trigger: Trigger::LateNight,
                relapse_risk: 0.8,
            });
            examples.push(LabeledExample {
                features: grocery.clone(),
                is_gambling: false,
                gambling_type: None,
                trigger: if i % 2 == 0 {
                    Trigger::Boredom
                } else {
                    Trigger::Weekend
                },
                relapse_risk: 0.1,
            });
        }
        examples
    }

    #[test]
    fn test_architecture_shape() {
        let network = MultiHeadNetwork::new(7);
        assert_eq!(network.architecture(), vec![122, 256, 128, 64, 32]);
        assert_eq!(network.input_dim(), FEATURE_COUNT);
    }

    #[test]
    fn test_forward_outputs_bounded_and_normalized() {
        let network = MultiHeadNetwork::new(7);
        let out = network.predict_vector(&vector_for("Sportsbet")).unwrap();

        assert!((0.0..=1.0).contains(&out.gambling));
        assert!((0.0..=1.0).contains(&out.relapse));
        assert_eq!(out.type_probs.len(), TYPE_CLASSES);
        assert_eq!(out.trigger_probs.len(), TRIGGER_CLASSES);
        assert!((out.type_probs.sum() - 1.0).abs() < 1e-4);
        assert!((out.trigger_probs.sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let network = MultiHeadNetwork::new(7);
        let features = vector_for("Sportsbet");

        let a = network.predict_vector(&features).unwrap();
        let b = network.predict_vector(&features).unwrap();

        assert_eq!(a.gambling, b.gambling);
        assert_eq!(a.relapse, b.relapse);
        assert_eq!(a.type_probs, b.type_probs);
        assert_eq!(a.trigger_probs, b.trigger_probs);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut network = MultiHeadNetwork::new(7);
        let examples = separable_examples();

        let options = TrainOptions {
            epochs: 40,
            batch_size: 8,
            validation_fraction: 0.2,
            learning_rate: 0.05,
            seed: Some(11),
        };
        let history = network.train(&examples, &options).unwrap();

        assert_eq!(history.epochs.len(), 40);
        let first = history.epochs.first().unwrap().train_loss;
        let last = history.epochs.last().unwrap().train_loss;
        assert!(last < first, "loss did not decrease: {} -> {}", first, last);
    }

    #[test]
    fn test_trained_network_separates_exemplars() {
        let mut network = MultiHeadNetwork::new(7);
        let examples = separable_examples();

        let options = TrainOptions {
            epochs: 60,
            batch_size: 8,
            validation_fraction: 0.0,
            learning_rate: 0.05,
            seed: Some(11),
        };
        network.train(&examples, &options).unwrap();

        let gambling = network.predict_vector(&vector_for("Sportsbet")).unwrap();
        let grocery = network.predict_vector(&vector_for("Woolworths")).unwrap();

        assert!(gambling.gambling > 0.5, "got {}", gambling.gambling);
        assert!(grocery.gambling < 0.5, "got {}", grocery.gambling);

        let report = network.evaluate(&examples).unwrap();
        assert!(report.accuracy > 0.9, "accuracy {}", report.accuracy);
    }

    #[test]
    fn test_empty_training_set_rejected() {
        let mut network = MultiHeadNetwork::new(7);
        let result = network.train(&[], &TrainOptions::default());
        assert!(matches!(result, Err(ModelError::EmptyTrainingSet)));
    }
}
