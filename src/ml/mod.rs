pub mod clip;
pub mod encoding;
pub mod policy;
pub mod training;

pub use clip::{clip_grad_norm, global_grad_norm};
pub use encoding::{ActionMask, SetEncoder, tensor_values};
pub use policy::{DEFAULT_HIDDEN, DEFAULT_STACK, PolicyConfig, SubsetPolicy};
pub use training::{
    EpochSummary, EvaluationSummary, ReinforceTrainer, StepDecay, StepOutcome, TrainingConfig,
    bernoulli_log_prob, evaluate_greedy, update_baseline,
};
