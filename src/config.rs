use std::fmt;
use std::path::{Path, PathBuf};

use burn::config::Config;

use crate::dataset::{
    CURRICULUM_SET_SIZES, DEFAULT_BITS, DEFAULT_EMPTY_SUBSET_REWARD, DEFAULT_INSTANCES,
    DEFAULT_TARGET, SubsetSum, SubsetSumBuilder,
};
use crate::error::SubsetError;
use crate::ml::policy::PolicyConfig;
use crate::ml::training::TrainingConfig;

/// Where tensors live for the whole run, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceChoice {
    Cpu,
    Gpu(usize),
}

impl DeviceChoice {
    /// Empty selects the CPU; otherwise the value is an adapter index or a
    /// comma-separated list of them, of which only the first is used.
    pub fn from_flag(flag: &str) -> Result<Self, SubsetError> {
        let flag = flag.trim();
        if flag.is_empty() {
            return Ok(Self::Cpu);
        }
        let first = flag.split(',').next().unwrap_or_default().trim();
        first
            .parse()
            .map(Self::Gpu)
            .map_err(|_| SubsetError::InvalidConfiguration("gpu must be empty or a device index"))
    }

    /// Keeps a GPU choice only if `available` can set up that adapter,
    /// otherwise training continues on the CPU.
    pub fn resolve<F>(self, available: F) -> Self
    where
        F: FnOnce(usize) -> bool,
    {
        match self {
            Self::Gpu(index) if available(index) => self,
            _ => Self::Cpu,
        }
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu(index) => write!(f, "gpu:{index}"),
        }
    }
}

/// Everything needed to reproduce one training run.
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    pub name: String,
    #[config(default = "String::from(\"set\")")]
    pub architecture: String,
    pub training: TrainingConfig,
    #[config(default = "DEFAULT_INSTANCES")]
    pub instances: usize,
    #[config(default = "DEFAULT_BITS")]
    pub bits: u32,
    #[config(default = "DEFAULT_TARGET")]
    pub target: u32,
    #[config(default = "DEFAULT_EMPTY_SUBSET_REWARD")]
    pub empty_subset_reward: f32,
    #[config(default = "None")]
    pub correct_subset_reward: Option<f32>,
    #[config(default = "crate::ml::policy::DEFAULT_HIDDEN")]
    pub hidden: usize,
    #[config(default = "crate::ml::policy::DEFAULT_STACK")]
    pub depth: usize,
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), SubsetError> {
        if self.instances == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "instance count must be positive",
            ));
        }
        if self.hidden == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "hidden width must be positive",
            ));
        }
        if self.depth == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "network depth must be positive",
            ));
        }
        self.training.validate()
    }

    /// `<name>_subsetsum_<architecture>`
    pub fn folder_name(&self) -> String {
        format!("{}_subsetsum_{}", self.name, self.architecture)
    }

    pub fn run_dir(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(self.folder_name())
    }

    pub fn universe(&self) -> usize {
        1usize << self.bits
    }

    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig::new(self.universe())
            .with_hidden(self.hidden)
            .with_depth(self.depth)
    }

    /// One generator per curriculum set size, smallest first.
    pub fn datasets(&self) -> Result<Vec<SubsetSum>, SubsetError> {
        SubsetSumBuilder::new(*CURRICULUM_SET_SIZES.start())
            .with_instances(self.instances)
            .with_bits(self.bits)
            .with_target(self.target)
            .with_empty_subset_reward(self.empty_subset_reward)
            .with_correct_subset_reward(self.correct_subset_reward)
            .with_seed(self.training.seed)
            .curriculum(CURRICULUM_SET_SIZES)
    }
}
