use std::fs;
use std::path::PathBuf;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use serde_json::Value;

use set2subset::{
    CHECKPOINT_FILE, ExperimentConfig, SubsetError, TRAINING_DATA_FILE, TrainingConfig,
    load_checkpoint, run_experiment,
};

type Backend = Autodiff<NdArray<f32>>;

fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("set2subset-{label}-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn small_experiment(epochs: usize) -> ExperimentConfig {
    let training = TrainingConfig::new(epochs).with_batch_size(32).with_seed(17);
    ExperimentConfig::new("smoke".to_string(), training)
        .with_instances(64)
        .with_hidden(16)
        .with_depth(1)
}

#[test]
fn single_epoch_run_writes_results() {
    let out_dir = scratch_dir("single-epoch");
    let config = small_experiment(1);
    let artifacts =
        run_experiment::<Backend>(&config, &out_dir, Default::default()).expect("run");

    assert_eq!(artifacts.run_dir, out_dir.join("smoke_subsetsum_set"));
    let raw = fs::read(artifacts.run_dir.join(TRAINING_DATA_FILE)).expect("training data");
    let data: Value = serde_json::from_slice(&raw).expect("json");
    for key in ["rewards", "advantages", "losses"] {
        assert_eq!(data[key].as_array().map(Vec::len), Some(1), "{key}");
    }
    // epoch 0 is a reporting epoch
    assert_eq!(data["sums"].as_array().map(Vec::len), Some(1));

    assert_eq!(artifacts.evaluations.len(), 10);
    assert!(artifacts.run_dir.join("config.json").exists());

    let (metadata, _model) = load_checkpoint::<NdArray<f32>>(
        &artifacts.run_dir.join(CHECKPOINT_FILE),
        &Default::default(),
    )
    .expect("checkpoint");
    assert_eq!(metadata.name, "smoke");
    assert_eq!(metadata.universe, 32);
    assert_eq!(metadata.epochs, 1);

    fs::remove_dir_all(&out_dir).ok();
}

#[test]
fn architecture_tag_names_the_run_folder() {
    let out_dir = scratch_dir("architecture");
    let config = small_experiment(2).with_architecture("seq".to_string());
    let artifacts =
        run_experiment::<Backend>(&config, &out_dir, Default::default()).expect("run");
    assert!(artifacts.run_dir.ends_with("smoke_subsetsum_seq"));
    assert_eq!(artifacts.history.losses.len(), 2);
    assert_eq!(artifacts.history.sums.len(), 1);
    fs::remove_dir_all(&out_dir).ok();
}

#[test]
fn zero_depth_network_is_a_configuration_error() {
    let out_dir = scratch_dir("zero-depth");
    let config = small_experiment(1).with_depth(0);
    let err = run_experiment::<Backend>(&config, &out_dir, Default::default())
        .expect_err("depth 0 must be rejected");
    assert!(matches!(err, SubsetError::InvalidConfiguration(_)), "{err}");
    assert!(!config.run_dir(&out_dir).exists());
    fs::remove_dir_all(&out_dir).ok();
}
