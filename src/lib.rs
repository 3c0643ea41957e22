//! Policy-gradient training of a subset selector: given a set of integers,
//! learn to pick a subset whose sum hits a target.

pub mod checkpoint;
pub mod config;
pub mod curriculum;
pub mod dataset;
pub mod error;
pub mod experiment;
pub mod ml;
pub mod report;

pub use crate::checkpoint::{CHECKPOINT_FILE, PolicyMetadata, load_checkpoint, save_checkpoint};
pub use crate::config::{DeviceChoice, ExperimentConfig};
pub use crate::curriculum::{CurriculumSchedule, pick_generator};
pub use crate::dataset::{
    CURRICULUM_SET_SIZES, ProblemInstance, SubsetReward, SubsetSum, SubsetSumBuilder,
};
pub use crate::error::SubsetError;
pub use crate::experiment::{RunArtifacts, run_experiment};
pub use crate::ml::{
    PolicyConfig, ReinforceTrainer, SubsetPolicy, TrainingConfig, evaluate_greedy,
    update_baseline,
};
pub use crate::report::{SamplePair, TRAINING_DATA_FILE, TrainingHistory};
