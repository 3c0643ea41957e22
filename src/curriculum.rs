use rand::Rng;

use crate::error::SubsetError;

pub const DEFAULT_INCREASE_EVERY: usize = 5;

/// Unlocks one more generator every `increase_every` epochs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurriculumSchedule {
    levels: usize,
    increase_every: usize,
}

impl CurriculumSchedule {
    pub fn new(levels: usize, increase_every: usize) -> Result<Self, SubsetError> {
        if levels == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "curriculum needs at least one generator",
            ));
        }
        if increase_every == 0 {
            return Err(SubsetError::InvalidConfiguration(
                "curriculum cadence must be positive",
            ));
        }
        Ok(Self {
            levels,
            increase_every,
        })
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn increase_every(&self) -> usize {
        self.increase_every
    }

    /// Generators available at `epoch`: `ceil((epoch + 1) / increase_every)`,
    /// capped at the number of levels.
    pub fn unlocked(&self, epoch: usize) -> usize {
        (epoch + 1).div_ceil(self.increase_every).min(self.levels)
    }

    /// First epoch at which every generator is unlocked.
    pub fn fully_unlocked_at(&self) -> usize {
        (self.levels - 1) * self.increase_every
    }
}

/// Picks the generator for `epoch` uniformly among those unlocked so far.
pub fn pick_generator<R: Rng + ?Sized>(
    epoch: usize,
    schedule: &CurriculumSchedule,
    rng: &mut R,
) -> usize {
    rng.gen_range(0..schedule.unlocked(epoch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn only_first_generator_at_epoch_zero() {
        let schedule = CurriculumSchedule::new(10, 5).expect("schedule");
        let mut rng = StdRng::seed_from_u64(11);
        assert_eq!(schedule.unlocked(0), 1);
        for _ in 0..100 {
            assert_eq!(pick_generator(0, &schedule, &mut rng), 0);
        }
    }

    #[test]
    fn unlock_count_is_monotonic_and_saturates() {
        let schedule = CurriculumSchedule::new(10, 5).expect("schedule");
        let mut previous = 0;
        for epoch in 0..200 {
            let unlocked = schedule.unlocked(epoch);
            assert!(unlocked >= previous);
            assert!(unlocked <= schedule.levels());
            if epoch >= schedule.fully_unlocked_at() {
                assert_eq!(unlocked, schedule.levels());
            }
            previous = unlocked;
        }
        assert_eq!(schedule.unlocked(4), 1);
        assert_eq!(schedule.unlocked(5), 2);
        assert_eq!(schedule.unlocked(44), 9);
        assert_eq!(schedule.unlocked(45), 10);
    }

    #[test]
    fn picks_stay_within_unlocked_prefix() {
        let schedule = CurriculumSchedule::new(4, 2).expect("schedule");
        let mut rng = StdRng::seed_from_u64(5);
        for epoch in 0..20 {
            let index = pick_generator(epoch, &schedule, &mut rng);
            assert!(index < schedule.unlocked(epoch));
        }
    }

    #[test]
    fn empty_or_zero_cadence_is_rejected() {
        assert!(CurriculumSchedule::new(0, 5).is_err());
        assert!(CurriculumSchedule::new(3, 0).is_err());
    }
}
