use std::ops::RangeInclusive;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use crate::error::SubsetError;

pub const DEFAULT_INSTANCES: usize = 10_000;
pub const DEFAULT_BITS: u32 = 5;
pub const DEFAULT_TARGET: u32 = 10;
pub const DEFAULT_EMPTY_SUBSET_REWARD: f32 = -1.0;
/// Set sizes of the curriculum, smallest first.
pub const CURRICULUM_SET_SIZES: RangeInclusive<usize> = 5..=14;
const MAX_BITS: u32 = 16;
const DEFAULT_SEED: u64 = 0x5E75_0B5E_75EE_D000;

/// Scores a proposed subset against the target sum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubsetReward {
    pub target: u32,
    pub empty_subset_reward: f32,
    pub correct_subset_reward: Option<f32>,
}

impl SubsetReward {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            empty_subset_reward: DEFAULT_EMPTY_SUBSET_REWARD,
            correct_subset_reward: None,
        }
    }

    pub fn with_empty_subset_reward(mut self, reward: f32) -> Self {
        self.empty_subset_reward = reward;
        self
    }

    pub fn with_correct_subset_reward(mut self, reward: Option<f32>) -> Self {
        self.correct_subset_reward = reward;
        self
    }

    /// Reward for selecting `mask` out of the set encoded by `set`.
    ///
    /// Only positions present in both the set and the mask count as selected.
    /// Without a correct-subset override an exact match scores 0, and every
    /// other non-empty subset scores its distance to the target, normalized
    /// by the target and negated.
    pub fn score(&self, set: &[u8], mask: &[u8]) -> f32 {
        let selected = subset_elements(set, mask);
        if selected.is_empty() {
            return self.empty_subset_reward;
        }
        let sum: u32 = selected.iter().sum();
        if sum == self.target {
            if let Some(reward) = self.correct_subset_reward {
                return reward;
            }
        }
        let distance = sum.abs_diff(self.target) as f32;
        -distance / self.target.max(1) as f32
    }

    /// Scores a batch given row-major actions of shape `[instances, universe]`.
    pub fn score_batch(
        &self,
        instances: &[ProblemInstance],
        actions: &[u8],
    ) -> Result<Vec<f32>, SubsetError> {
        let universe = instances.first().map(ProblemInstance::universe).unwrap_or(0);
        if actions.len() != instances.len() * universe {
            return Err(SubsetError::ShapeMismatch {
                instances: instances.len(),
                values: actions.len(),
            });
        }
        Ok(instances
            .iter()
            .zip(actions.chunks(universe.max(1)))
            .map(|(instance, mask)| self.score(instance.bits(), mask))
            .collect())
    }
}

impl Default for SubsetReward {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}

/// Decodes a membership vector into its integers; position `i` holds `i + 1`.
pub fn bits_to_integers(bits: &[u8]) -> Vec<u32> {
    bits.iter()
        .enumerate()
        .filter(|(_, bit)| **bit != 0)
        .map(|(index, _)| index as u32 + 1)
        .collect()
}

/// Integers present in `set` and selected by `mask`.
pub fn subset_elements(set: &[u8], mask: &[u8]) -> Vec<u32> {
    set.iter()
        .zip(mask)
        .enumerate()
        .filter(|(_, (member, chosen))| **member != 0 && **chosen != 0)
        .map(|(index, _)| index as u32 + 1)
        .collect()
}

/// One integer set, stored as a membership vector over the universe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProblemInstance {
    bits: Vec<u8>,
}

impl ProblemInstance {
    pub fn from_bits(bits: Vec<u8>) -> Self {
        Self { bits }
    }

    pub fn from_integers(values: &[u32], universe: usize) -> Result<Self, SubsetError> {
        let mut bits = vec![0u8; universe];
        for &value in values {
            let index = (value as usize)
                .checked_sub(1)
                .filter(|index| *index < universe)
                .ok_or(SubsetError::InvalidConfiguration(
                    "integer lies outside the universe",
                ))?;
            bits[index] = 1;
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn universe(&self) -> usize {
        self.bits.len()
    }

    /// Number of integers in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().filter(|bit| **bit != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn integers(&self) -> Vec<u32> {
        bits_to_integers(&self.bits)
    }

    pub fn sum(&self) -> u32 {
        self.integers().iter().sum()
    }

    pub fn subset(&self, mask: &[u8]) -> Vec<u32> {
        subset_elements(&self.bits, mask)
    }
}

/// Parameters of one subset-sum generator.
#[derive(Clone, Copy, Debug)]
pub struct SubsetSumConfig {
    pub instances: usize,
    pub set_size: usize,
    pub bits: u32,
    pub reward: SubsetReward,
    pub seed: u64,
}

impl SubsetSumConfig {
    pub fn universe(&self) -> usize {
        1usize << self.bits
    }

    fn validate(&self) -> Result<(), SubsetError> {
        if self.instances == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "instance count must be positive",
            ));
        }
        if self.bits == 0 || self.bits > MAX_BITS {
            return Err(SubsetError::InvalidConfiguration(
                "bit width must be between 1 and 16",
            ));
        }
        if self.set_size == 0 {
            return Err(SubsetError::InvalidConfiguration("set size must be positive"));
        }
        if self.set_size > self.universe() {
            return Err(SubsetError::SetTooLarge {
                set_size: self.set_size,
                universe: self.universe(),
            });
        }
        if self.reward.target == 0 {
            return Err(SubsetError::InvalidConfiguration("target must be positive"));
        }
        Ok(())
    }
}

/// Builder for [`SubsetSum`] generators, also used to stamp out a curriculum.
#[derive(Clone, Debug)]
pub struct SubsetSumBuilder {
    config: SubsetSumConfig,
}

impl SubsetSumBuilder {
    pub fn new(set_size: usize) -> Self {
        Self {
            config: SubsetSumConfig {
                instances: DEFAULT_INSTANCES,
                set_size,
                bits: DEFAULT_BITS,
                reward: SubsetReward::default(),
                seed: DEFAULT_SEED,
            },
        }
    }

    pub fn with_instances(mut self, instances: usize) -> Self {
        self.config.instances = instances;
        self
    }

    pub fn with_bits(mut self, bits: u32) -> Self {
        self.config.bits = bits;
        self
    }

    pub fn with_target(mut self, target: u32) -> Self {
        self.config.reward.target = target;
        self
    }

    pub fn with_empty_subset_reward(mut self, reward: f32) -> Self {
        self.config.reward.empty_subset_reward = reward;
        self
    }

    pub fn with_correct_subset_reward(mut self, reward: Option<f32>) -> Self {
        self.config.reward.correct_subset_reward = reward;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> Result<SubsetSum, SubsetError> {
        SubsetSum::new(self.config)
    }

    /// One generator per set size, in the given order, with seeds derived
    /// from this builder's seed.
    pub fn curriculum<I>(&self, set_sizes: I) -> Result<Vec<SubsetSum>, SubsetError>
    where
        I: IntoIterator<Item = usize>,
    {
        let datasets = set_sizes
            .into_iter()
            .map(|set_size| {
                let mut config = self.config;
                config.set_size = set_size;
                config.seed = mix_seed(self.config.seed, set_size as u64);
                SubsetSum::new(config)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if datasets.is_empty() {
            return Err(SubsetError::InvalidConfiguration(
                "curriculum needs at least one set size",
            ));
        }
        Ok(datasets)
    }
}

/// Randomly generated subset-sum problems of one set size.
pub struct SubsetSum {
    config: SubsetSumConfig,
    instances: Vec<ProblemInstance>,
    rng: StdRng,
}

impl SubsetSum {
    pub fn builder(set_size: usize) -> SubsetSumBuilder {
        SubsetSumBuilder::new(set_size)
    }

    pub fn new(config: SubsetSumConfig) -> Result<Self, SubsetError> {
        config.validate()?;
        let mut dataset = Self {
            config,
            instances: Vec::with_capacity(config.instances),
            rng: StdRng::seed_from_u64(config.seed),
        };
        dataset.refresh();
        Ok(dataset)
    }

    pub fn config(&self) -> &SubsetSumConfig {
        &self.config
    }

    pub fn set_size(&self) -> usize {
        self.config.set_size
    }

    pub fn universe(&self) -> usize {
        self.config.universe()
    }

    pub fn reward(&self) -> &SubsetReward {
        &self.config.reward
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[ProblemInstance] {
        &self.instances
    }

    /// Replaces every instance with a freshly sampled set.
    pub fn refresh(&mut self) {
        let universe = self.universe();
        let set_size = self.config.set_size;
        self.instances.clear();
        for _ in 0..self.config.instances {
            let mut bits = vec![0u8; universe];
            for index in sample(&mut self.rng, universe, set_size).iter() {
                bits[index] = 1;
            }
            self.instances.push(ProblemInstance { bits });
        }
    }

    pub fn batches(&self, batch_size: usize) -> std::slice::Chunks<'_, ProblemInstance> {
        self.instances.chunks(batch_size.max(1))
    }

    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.instances.len().div_ceil(batch_size.max(1))
    }
}

fn mix_seed(base: u64, salt: u64) -> u64 {
    let mut z = base ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z ^= z >> 30;
    z = z.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z ^= z >> 27;
    z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_sets_have_configured_size() {
        for set_size in CURRICULUM_SET_SIZES {
            let dataset = SubsetSum::builder(set_size)
                .with_instances(64)
                .build()
                .expect("dataset");
            assert_eq!(dataset.len(), 64);
            assert!(
                dataset
                    .instances()
                    .iter()
                    .all(|instance| instance.len() == set_size)
            );
        }
    }

    #[test]
    fn refresh_draws_new_sets() {
        let mut dataset = SubsetSum::builder(6)
            .with_instances(32)
            .with_seed(3)
            .build()
            .expect("dataset");
        let before = dataset.instances().to_vec();
        dataset.refresh();
        assert_eq!(dataset.len(), before.len());
        assert_ne!(dataset.instances(), before.as_slice());
        assert!(dataset.instances().iter().all(|instance| instance.len() == 6));
    }

    #[test]
    fn oversized_sets_are_rejected() {
        let result = SubsetSum::builder(40).with_bits(5).build();
        assert!(matches!(
            result,
            Err(SubsetError::SetTooLarge {
                set_size: 40,
                universe: 32
            })
        ));
    }

    #[test]
    fn integers_round_trip_through_bits() {
        let instance = ProblemInstance::from_integers(&[1, 4, 32], 32).expect("instance");
        assert_eq!(instance.len(), 3);
        assert_eq!(instance.integers(), vec![1, 4, 32]);
        assert_eq!(instance.sum(), 37);
        assert!(ProblemInstance::from_integers(&[0], 32).is_err());
        assert!(ProblemInstance::from_integers(&[33], 32).is_err());
    }

    #[test]
    fn subset_ignores_positions_outside_the_set() {
        let instance = ProblemInstance::from_integers(&[2, 3], 4).expect("instance");
        assert_eq!(instance.subset(&[1, 1, 0, 1]), vec![2]);
    }

    #[test]
    fn reward_handles_empty_and_exact_subsets() {
        let set = ProblemInstance::from_integers(&[1, 2, 3, 4], 32).expect("instance");
        let everything = set.bits().to_vec();
        let nothing = vec![0u8; 32];

        let reward = SubsetReward::new(10).with_correct_subset_reward(Some(5.0));
        assert_eq!(reward.score(set.bits(), &everything), 5.0);
        assert_eq!(reward.score(set.bits(), &nothing), -1.0);

        let plain = SubsetReward::new(10).with_empty_subset_reward(-3.0);
        assert_eq!(plain.score(set.bits(), &everything), 0.0);
        assert_eq!(plain.score(set.bits(), &nothing), -3.0);
    }

    #[test]
    fn reward_penalizes_distance_to_target() {
        let set = ProblemInstance::from_integers(&[1, 2, 3, 4], 32).expect("instance");
        let reward = SubsetReward::new(10);
        let mut mask = vec![0u8; 32];
        mask[3] = 1; // selects 4
        assert!((reward.score(set.bits(), &mask) + 0.6).abs() < 1e-6);
    }

    #[test]
    fn score_batch_checks_shape() {
        let set = ProblemInstance::from_integers(&[1, 2], 4).expect("instance");
        let reward = SubsetReward::new(3);
        let scores = reward
            .score_batch(&[set.clone(), set.clone()], &[1, 1, 0, 0, 0, 0, 0, 0])
            .expect("scores");
        assert_eq!(scores, vec![0.0, -1.0]);
        assert!(reward.score_batch(&[set], &[1, 1]).is_err());
    }

    #[test]
    fn curriculum_builds_one_generator_per_size() {
        let datasets = SubsetSum::builder(5)
            .with_instances(8)
            .curriculum(CURRICULUM_SET_SIZES)
            .expect("curriculum");
        let sizes: Vec<usize> = datasets.iter().map(SubsetSum::set_size).collect();
        assert_eq!(sizes, CURRICULUM_SET_SIZES.collect::<Vec<_>>());
        assert!(SubsetSum::builder(5).curriculum(Vec::new()).is_err());
    }
}
