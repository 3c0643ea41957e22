use burn::config::Config;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, LearningRate, Optimizer};
use burn::tensor::activation::{log_sigmoid, sigmoid};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::clip::clip_grad_norm;
use super::encoding::{ActionMask, SetEncoder, tensor_values};
use super::policy::SubsetPolicy;
use crate::curriculum::{CurriculumSchedule, pick_generator};
use crate::dataset::{ProblemInstance, SubsetReward, SubsetSum};
use crate::error::SubsetError;
use crate::report::{SamplePair, TrainingHistory};

pub const DEFAULT_SEED: u64 = 0x5EB5_E75E_ED00_0001;
const CURRICULUM_SALT: u64 = 0xC0FF_EE00_C0FF_EE00;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    /// Smoothing factor of the moving-average baseline.
    #[config(default = 0.9)]
    pub beta: f32,
    #[config(default = 2.0)]
    pub max_grad_norm: f32,
    #[config(default = 1.0e-4)]
    pub learning_rate: f64,
    /// Epochs between learning-rate decays.
    #[config(default = 10)]
    pub lr_step: usize,
    #[config(default = 0.1)]
    pub lr_gamma: f64,
    #[config(default = 5)]
    pub increase_every: usize,
    #[config(default = 128)]
    pub log_every: usize,
    #[config(default = 50)]
    pub report_every: usize,
    #[config(default = 5)]
    pub report_pairs: usize,
    #[config(default = "DEFAULT_SEED")]
    pub seed: u64,
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), SubsetError> {
        if self.batch_size == 0 {
            return Err(SubsetError::InvalidConfiguration("batch size must be positive"));
        }
        if !(0.0..1.0).contains(&self.beta) {
            return Err(SubsetError::InvalidConfiguration("beta must be in [0, 1)"));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(SubsetError::InvalidConfiguration(
                "gradient norm bound must be positive",
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(SubsetError::InvalidConfiguration(
                "learning rate must be positive",
            ));
        }
        if self.lr_step == 0 || self.log_every == 0 || self.report_every == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "step, log and report intervals must be positive",
            ));
        }
        Ok(())
    }

    pub fn decay(&self) -> StepDecay {
        StepDecay {
            base: self.learning_rate,
            step_size: self.lr_step,
            gamma: self.lr_gamma,
        }
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepDecay {
    pub base: LearningRate,
    pub step_size: usize,
    pub gamma: f64,
}

impl StepDecay {
    pub fn at(&self, epoch: usize) -> LearningRate {
        let decays = (epoch / self.step_size.max(1)) as i32;
        self.base * self.gamma.powi(decays)
    }
}

/// Exponential moving average of batch rewards. `None` seeds with the batch mean.
pub fn update_baseline(previous: Option<f32>, batch_mean: f32, beta: f32) -> f32 {
    match previous {
        None => batch_mean,
        Some(baseline) => beta * baseline + (1.0 - beta) * batch_mean,
    }
}

/// Log-probability of each sampled action under independent Bernoulli
/// distributions parameterized by `logits`.
pub fn bernoulli_log_prob<B: Backend>(logits: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 2> {
    let include = log_sigmoid(logits.clone()) * actions.clone();
    let exclude = log_sigmoid(logits.neg()) * actions.neg().add_scalar(1.0);
    include + exclude
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Everything observed during one policy-gradient step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub baseline: f32,
    pub mean_reward: f32,
    pub rewards: Vec<f32>,
    pub advantages: Vec<f32>,
    pub loss: f32,
    /// Gradient norm before clipping.
    pub grad_norm: f32,
    /// Sampled masks, row-major `[batch, universe]`.
    pub actions: Vec<u8>,
}

impl StepOutcome {
    pub fn first_advantage(&self) -> f32 {
        self.advantages.first().copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct EpochSummary {
    pub epoch: usize,
    pub generator: usize,
    pub set_size: usize,
    pub batches: usize,
    pub learning_rate: LearningRate,
    pub last_step: StepOutcome,
    pub samples: Option<Vec<SamplePair>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationSummary {
    pub set_size: usize,
    pub instances: usize,
    pub mean_reward: f32,
    /// Fraction of instances whose greedy subset hits the target exactly.
    pub exact_rate: f32,
}

/// Scores the deterministic policy (include when probability > 0.5) on a dataset.
pub fn evaluate_greedy<B: Backend>(
    model: &SubsetPolicy<B>,
    dataset: &SubsetSum,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvaluationSummary, SubsetError> {
    let reward = dataset.reward();
    let mut total_reward = 0.0f32;
    let mut exact = 0usize;
    for batch in dataset.batches(batch_size) {
        let input = SetEncoder::encode_tensor::<B>(batch, device);
        let probabilities = tensor_values(model.probabilities(input))?;
        let actions = ActionMask::greedy(&probabilities);
        total_reward += reward.score_batch(batch, &actions)?.iter().sum::<f32>();
        exact += batch
            .iter()
            .zip(actions.chunks(dataset.universe()))
            .filter(|(instance, mask)| {
                let subset = instance.subset(mask);
                !subset.is_empty() && subset.iter().sum::<u32>() == reward.target
            })
            .count();
    }
    let instances = dataset.len().max(1) as f32;
    Ok(EvaluationSummary {
        set_size: dataset.set_size(),
        instances: dataset.len(),
        mean_reward: total_reward / instances,
        exact_rate: exact as f32 / instances,
    })
}

/// REINFORCE trainer with a moving-average baseline and a step-decayed Adam.
pub struct ReinforceTrainer<B: AutodiffBackend> {
    model: SubsetPolicy<B>,
    optimizer: OptimizerAdaptor<Adam, SubsetPolicy<B>, B>,
    config: TrainingConfig,
    device: B::Device,
    rng: StdRng,
}

impl<B: AutodiffBackend> ReinforceTrainer<B> {
    pub fn new(
        model: SubsetPolicy<B>,
        config: TrainingConfig,
        device: B::Device,
    ) -> Result<Self, SubsetError> {
        config.validate()?;
        let optimizer = AdamConfig::new().init();
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            model,
            optimizer,
            config,
            device,
            rng,
        })
    }

    pub fn model(&self) -> &SubsetPolicy<B> {
        &self.model
    }

    pub fn into_model(self) -> SubsetPolicy<B> {
        self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// One REINFORCE update on `batch`. The returned outcome carries the
    /// baseline to pass into the next step of the same epoch.
    pub fn train_step(
        &mut self,
        batch: &[ProblemInstance],
        reward: &SubsetReward,
        baseline: Option<f32>,
        learning_rate: LearningRate,
    ) -> Result<StepOutcome, SubsetError> {
        let Some(first) = batch.first() else {
            return Err(SubsetError::InvalidConfiguration(
                "cannot train on an empty batch",
            ));
        };
        let shape = [batch.len(), first.universe()];
        let logits = self.model.forward_instances(batch, &self.device);
        let probabilities = tensor_values(sigmoid(logits.clone().detach()))?;
        let actions: Vec<u8> = probabilities
            .iter()
            .map(|probability| u8::from(self.rng.gen_range(0.0f32..1.0) < *probability))
            .collect();

        let rewards = reward.score_batch(batch, &actions)?;
        let mean_reward = mean(&rewards);
        let baseline = update_baseline(baseline, mean_reward, self.config.beta);
        let advantages: Vec<f32> = rewards.iter().map(|reward| reward - baseline).collect();

        let action_tensor = ActionMask::to_tensor::<B>(&actions, shape, &self.device);
        let advantage_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(advantages.clone(), [batch.len(), 1]),
            &self.device,
        );
        let log_probs = bernoulli_log_prob(logits, action_tensor);
        let loss = (log_probs * advantage_tensor).sum().neg();
        let loss_value = tensor_values(loss.clone().detach())?
            .first()
            .copied()
            .unwrap_or_default();

        let mut grads = GradientsParams::from_grads(loss.backward(), &self.model);
        let grad_norm = clip_grad_norm(&self.model, &mut grads, self.config.max_grad_norm)?;
        let model = self.model.clone();
        self.model = self.optimizer.step(learning_rate, model, grads);

        Ok(StepOutcome {
            baseline,
            mean_reward,
            rewards,
            advantages,
            loss: loss_value,
            grad_norm,
            actions,
        })
    }

    /// Runs every batch of `dataset` once. The baseline restarts from the
    /// first batch's mean reward.
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        generator: usize,
        dataset: &SubsetSum,
    ) -> Result<EpochSummary, SubsetError> {
        let learning_rate = self.config.decay().at(epoch);
        let batch_size = self.config.batch_size;
        let mut baseline = None;
        let mut last: Option<(&[ProblemInstance], StepOutcome)> = None;
        let mut batches = 0usize;
        for (index, batch) in dataset.batches(batch_size).enumerate() {
            let outcome = self.train_step(batch, dataset.reward(), baseline, learning_rate)?;
            baseline = Some(outcome.baseline);
            if index % self.config.log_every == 0 {
                info!(
                    "epoch: {} advantage: {:.4} loss: {:.4}",
                    epoch,
                    outcome.first_advantage(),
                    outcome.loss
                );
            }
            debug!(
                "epoch {epoch} batch {index}: reward {:.4} baseline {:.4} grad norm {:.4}",
                outcome.mean_reward, outcome.baseline, outcome.grad_norm
            );
            batches += 1;
            last = Some((batch, outcome));
        }
        let Some((last_batch, last_step)) = last else {
            return Err(SubsetError::InvalidConfiguration("dataset has no batches"));
        };
        let samples = (epoch % self.config.report_every == 0).then(|| {
            SamplePair::from_batch(last_batch, &last_step.actions, self.config.report_pairs)
        });
        Ok(EpochSummary {
            epoch,
            generator,
            set_size: dataset.set_size(),
            batches,
            learning_rate,
            last_step,
            samples,
        })
    }

    /// Trains for `epochs` epochs over a curriculum of generators ordered by
    /// increasing set size. `on_epoch` sees every summary as it completes.
    pub fn fit<F>(
        &mut self,
        datasets: &mut [SubsetSum],
        epochs: usize,
        mut on_epoch: F,
    ) -> Result<TrainingHistory, SubsetError>
    where
        F: FnMut(&EpochSummary),
    {
        let schedule = CurriculumSchedule::new(datasets.len(), self.config.increase_every)?;
        let mut curriculum_rng = StdRng::seed_from_u64(self.config.seed ^ CURRICULUM_SALT);
        let mut history = TrainingHistory::default();
        for epoch in 0..epochs {
            let generator = pick_generator(epoch, &schedule, &mut curriculum_rng);
            let dataset = &mut datasets[generator];
            dataset.refresh();
            let summary = self.train_epoch(epoch, generator, dataset)?;
            if let Some(samples) = &summary.samples {
                for pair in samples {
                    info!("full set: {:?}", pair.full_set);
                    info!("subset: {:?}", pair.subset);
                    info!("sum: {}", pair.sum);
                }
            }
            history.record(&summary);
            on_epoch(&summary);
        }
        Ok(history)
    }

    pub fn evaluate(&self, dataset: &SubsetSum) -> Result<EvaluationSummary, SubsetError> {
        evaluate_greedy(&self.model, dataset, self.config.batch_size, &self.device)
    }
}
