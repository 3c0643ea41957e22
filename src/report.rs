use std::fs;
use std::path::Path;

use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::ProblemInstance;
use crate::error::SubsetError;
use crate::ml::training::EpochSummary;

pub const TRAINING_DATA_FILE: &str = "training_data.json";
pub const TRAINING_CURVES_FILE: &str = "training_curves.png";

/// Per-epoch series written to `training_data.json`.
///
/// `rewards`, `advantages` and `losses` hold the statistics of each epoch's
/// final batch. `sums` only grows on reporting epochs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub sums: Vec<f32>,
    pub rewards: Vec<f32>,
    pub advantages: Vec<f32>,
    pub losses: Vec<f32>,
}

impl TrainingHistory {
    pub fn record(&mut self, summary: &EpochSummary) {
        let step = &summary.last_step;
        self.rewards.push(step.mean_reward);
        self.advantages.push(step.first_advantage());
        self.losses.push(step.loss);
        if let Some(samples) = &summary.samples {
            self.sums.push(SamplePair::mean_sum(samples));
        }
    }

    pub fn epochs(&self) -> usize {
        self.losses.len()
    }

    pub fn save(&self, path: &Path) -> Result<(), SubsetError> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SubsetError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

/// A set and the subset the policy picked from it, decoded to integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplePair {
    pub full_set: Vec<u32>,
    pub subset: Vec<u32>,
    pub sum: u32,
}

impl SamplePair {
    /// Decodes up to `limit` pairs from a batch and its row-major actions.
    pub fn from_batch(instances: &[ProblemInstance], actions: &[u8], limit: usize) -> Vec<Self> {
        let universe = instances.first().map(ProblemInstance::universe).unwrap_or(1);
        instances
            .iter()
            .zip(actions.chunks(universe.max(1)))
            .take(limit)
            .map(|(instance, mask)| {
                let subset = instance.subset(mask);
                Self {
                    full_set: instance.integers(),
                    sum: subset.iter().sum(),
                    subset,
                }
            })
            .collect()
    }

    pub fn mean_sum(pairs: &[Self]) -> f32 {
        if pairs.is_empty() {
            return 0.0;
        }
        pairs.iter().map(|pair| pair.sum as f32).sum::<f32>() / pairs.len() as f32
    }
}

/// Draws mean reward and loss per epoch, one panel each.
pub fn render_training_curves(out: &Path, history: &TrainingHistory) -> Result<(), SubsetError> {
    let root = BitMapBackend::new(out, (1000, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;
    let panels = root.split_evenly((2, 1));
    draw_series(&panels[0], "Reward (last batch)", &history.rewards, &BLUE)?;
    draw_series(&panels[1], "Loss (last batch)", &history.losses, &RED)?;
    root.present().map_err(chart_error)?;
    Ok(())
}

fn draw_series(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    caption: &str,
    values: &[f32],
    color: &RGBColor,
) -> Result<(), SubsetError> {
    let (low, high) = values
        .iter()
        .filter(|value| value.is_finite())
        .fold((f32::MAX, f32::MIN), |(low, high), value| {
            (low.min(*value), high.max(*value))
        });
    let (low, high) = if low > high {
        (0.0, 1.0)
    } else if (high - low).abs() < f32::EPSILON {
        (low - 1.0, high + 1.0)
    } else {
        (low, high)
    };

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..values.len().max(1), low..high)
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_label_formatter(&|v| format!("{v:.3}"))
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(LineSeries::new(
            values
                .iter()
                .enumerate()
                .filter(|(_, value)| value.is_finite())
                .map(|(epoch, value)| (epoch, *value)),
            color,
        ))
        .map_err(chart_error)?;
    Ok(())
}

fn chart_error<E: std::fmt::Display>(err: E) -> SubsetError {
    SubsetError::Chart(err.to_string())
}
