use std::fs;
use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn_train::logger::{FileMetricLogger, MetricLogger};
use burn_train::metric::MetricEntry;
use log::{info, warn};

use crate::checkpoint::{CHECKPOINT_FILE, PolicyMetadata, save_checkpoint};
use crate::config::ExperimentConfig;
use crate::error::SubsetError;
use crate::ml::training::{EpochSummary, EvaluationSummary, ReinforceTrainer};
use crate::report::{
    TRAINING_CURVES_FILE, TRAINING_DATA_FILE, TrainingHistory, render_training_curves,
};

pub const CONFIG_FILE: &str = "config.json";
pub const METRICS_DIR: &str = "train";

/// What a finished run leaves behind, besides the files in `run_dir`.
#[derive(Debug)]
pub struct RunArtifacts {
    pub run_dir: PathBuf,
    pub history: TrainingHistory,
    pub evaluations: Vec<EvaluationSummary>,
}

/// Trains a policy end to end and writes results under
/// `<out_dir>/<name>_subsetsum_<architecture>/`.
pub fn run_experiment<B: AutodiffBackend>(
    config: &ExperimentConfig,
    out_dir: &Path,
    device: B::Device,
) -> Result<RunArtifacts, SubsetError> {
    config.validate()?;
    let run_dir = config.run_dir(out_dir);
    fs::create_dir_all(&run_dir)?;
    config.save(run_dir.join(CONFIG_FILE))?;

    let mut datasets = config.datasets()?;
    let model = config.policy().init::<B>(&device);
    let mut trainer = ReinforceTrainer::new(model, config.training.clone(), device)?;
    info!(
        "training {} for {} epochs over set sizes {}..={} -> {}",
        config.folder_name(),
        config.training.epochs,
        datasets.first().map(|d| d.set_size()).unwrap_or_default(),
        datasets.last().map(|d| d.set_size()).unwrap_or_default(),
        run_dir.display()
    );

    let metrics_dir = run_dir.join(METRICS_DIR);
    fs::create_dir_all(&metrics_dir)?;
    let mut metric_logger = FileMetricLogger::new_train(&metrics_dir);
    let history = trainer.fit(&mut datasets, config.training.epochs, |summary| {
        log_epoch_metrics(&mut metric_logger, summary);
    })?;

    history.save(&run_dir.join(TRAINING_DATA_FILE))?;
    if let Err(err) = render_training_curves(&run_dir.join(TRAINING_CURVES_FILE), &history) {
        warn!("skipping training curves: {err}");
    }

    let mut evaluations = Vec::with_capacity(datasets.len());
    for dataset in datasets.iter_mut() {
        dataset.refresh();
        let evaluation = trainer.evaluate(dataset)?;
        info!(
            "greedy policy, set size {:>2}: mean reward {:.4}, exact {:.1}%",
            evaluation.set_size,
            evaluation.mean_reward,
            evaluation.exact_rate * 100.0
        );
        evaluations.push(evaluation);
    }

    let metadata = PolicyMetadata {
        name: config.name.clone(),
        architecture: config.architecture.clone(),
        universe: config.universe(),
        hidden: config.hidden,
        depth: config.depth,
        epochs: config.training.epochs,
        learning_rate: config.training.learning_rate,
        seed: config.training.seed,
        target: config.target,
        final_reward: history.rewards.last().copied(),
        final_loss: history.losses.last().copied(),
    };
    let checkpoint_path = run_dir.join(CHECKPOINT_FILE);
    save_checkpoint(&checkpoint_path, trainer.into_model().valid(), metadata)?;
    info!("checkpoint saved -> {}", checkpoint_path.display());

    Ok(RunArtifacts {
        run_dir,
        history,
        evaluations,
    })
}

fn log_epoch_metrics(logger: &mut FileMetricLogger, summary: &EpochSummary) {
    let step = &summary.last_step;
    let values = [
        ("Reward", step.mean_reward),
        ("Advantage", step.first_advantage()),
        ("Loss", step.loss),
    ];
    for (name, value) in values {
        let entry = MetricEntry::new(
            name.to_string().into(),
            format!("epoch {value:.6} (set size {})", summary.set_size),
            format!("{value:.8},{}", step.rewards.len()),
        );
        logger.log(&entry);
    }
    logger.end_epoch(summary.epoch + 1);
}
