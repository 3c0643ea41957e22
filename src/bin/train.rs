use std::error::Error;
use std::panic;
use std::path::{Path, PathBuf};

use burn::backend::Wgpu;
use burn::backend::wgpu::WgpuDevice;
use burn::tensor::Tensor;
use burn::tensor::backend::AutodiffBackend;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use log::info;

use set2subset::ml::training::DEFAULT_SEED;
use set2subset::ml::{DEFAULT_HIDDEN, DEFAULT_STACK};
use set2subset::{DeviceChoice, ExperimentConfig, TrainingConfig, run_experiment};

type CpuBackend = Autodiff<NdArray<f32>>;
type GpuBackend = Autodiff<Wgpu>;

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train a subset-sum selection policy with REINFORCE",
    version
)]
struct TrainArgs {
    /// Number of training epochs.
    #[arg(short = 'e', long)]
    epochs: usize,
    /// Architecture tag, used in the output folder name.
    #[arg(short = 'a', long, default_value = "set")]
    architecture: String,
    /// Accelerator index; empty trains on the CPU.
    #[arg(short = 'g', long, default_value = "")]
    gpu: String,
    /// Reward for proposing the empty subset.
    #[arg(
        long = "empty_subset_reward",
        visible_alias = "empty-r",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    empty_subset_reward: i32,
    /// Reward for a subset that hits the target exactly.
    #[arg(
        long = "correct_subset_reward",
        visible_alias = "correct-r",
        allow_negative_numbers = true
    )]
    correct_subset_reward: Option<i32>,
    /// Experiment name, used in the output folder name.
    #[arg(short = 'n', long)]
    name: String,
    /// Directory that receives the run folder.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Master seed for data generation, sampling and the curriculum.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Epochs between curriculum unlocks.
    #[arg(long, default_value_t = 5)]
    increase_every: usize,
    /// Initial Adam learning rate, divided by ten every ten epochs.
    #[arg(long, default_value_t = 1.0e-4)]
    learning_rate: f64,
    /// Hidden layer width of the policy network.
    #[arg(long, default_value_t = DEFAULT_HIDDEN)]
    hidden: usize,
    /// Number of hidden layers of the policy network.
    #[arg(long, default_value_t = DEFAULT_STACK)]
    depth: usize,
}

impl TrainArgs {
    fn experiment(&self) -> ExperimentConfig {
        let training = TrainingConfig::new(self.epochs)
            .with_seed(self.seed)
            .with_increase_every(self.increase_every)
            .with_learning_rate(self.learning_rate);
        ExperimentConfig::new(self.name.clone(), training)
            .with_architecture(self.architecture.clone())
            .with_empty_subset_reward(self.empty_subset_reward as f32)
            .with_correct_subset_reward(self.correct_subset_reward.map(|reward| reward as f32))
            .with_hidden(self.hidden)
            .with_depth(self.depth)
    }
}

/// Single-dash long flags accepted on the command line, with their clap names.
const LEGACY_FLAGS: [(&str, &str); 2] = [
    ("-empty_r", "--empty_subset_reward"),
    ("-correct_r", "--correct_subset_reward"),
];

/// Rewrites `-empty_r` and `-correct_r` (also in `flag=value` form) so clap
/// does not read them as bundles of short flags.
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            for (legacy, long) in LEGACY_FLAGS {
                if arg == legacy {
                    return long.to_string();
                }
                let value = arg.strip_prefix(legacy).and_then(|rest| rest.strip_prefix('='));
                if let Some(value) = value {
                    return format!("{long}={value}");
                }
            }
            arg
        })
        .collect()
}

/// Sets up one tensor on the adapter. wgpu reports a missing adapter by
/// panicking, so the panic is caught and the default hook muted meanwhile.
fn wgpu_available(index: usize) -> bool {
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let available = panic::catch_unwind(|| {
        let device = WgpuDevice::DiscreteGpu(index);
        Tensor::<Wgpu, 1>::zeros([1], &device).into_data()
    })
    .is_ok();
    panic::set_hook(hook);
    available
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = TrainArgs::parse_from(normalize_args(std::env::args()));
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: TrainArgs) -> Result<(), Box<dyn Error>> {
    // SAFETY: no other thread exists yet; backends are created afterwards.
    unsafe {
        std::env::set_var("CUDA_DEVICE_ORDER", "PCI_BUS_ID");
        std::env::set_var("CUDA_VISIBLE_DEVICES", &args.gpu);
    }
    let config = args.experiment();
    config.validate()?;
    let device = DeviceChoice::from_flag(&args.gpu)?.resolve(wgpu_available);
    match device {
        DeviceChoice::Cpu => train::<CpuBackend>(&config, &args.out_dir, NdArrayDevice::Cpu),
        DeviceChoice::Gpu(index) => {
            info!("Using GPU ({device})");
            train::<GpuBackend>(&config, &args.out_dir, WgpuDevice::DiscreteGpu(index))
        }
    }
}

fn train<B: AutodiffBackend>(
    config: &ExperimentConfig,
    out_dir: &Path,
    device: B::Device,
) -> Result<(), Box<dyn Error>> {
    let artifacts = run_experiment::<B>(config, out_dir, device)?;
    info!(
        "finished {} epochs, results in {}",
        artifacts.history.epochs(),
        artifacts.run_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn single_dash_reward_flags_are_accepted() {
        let args = normalize_args(argv(&[
            "train", "-e", "3", "-n", "run", "-empty_r", "-2", "-correct_r=4",
        ]));
        assert_eq!(args[5], "--empty_subset_reward");
        assert_eq!(args[7], "--correct_subset_reward=4");

        let parsed = TrainArgs::try_parse_from(args).expect("parse");
        assert_eq!(parsed.epochs, 3);
        assert_eq!(parsed.empty_subset_reward, -2);
        assert_eq!(parsed.correct_subset_reward, Some(4));
    }

    #[test]
    fn other_arguments_pass_through() {
        let args = argv(&["train", "-e", "1", "-n", "-empty_rx", "--empty-r", "-3"]);
        assert_eq!(normalize_args(args.clone()), args);
    }

    #[test]
    fn defaults_match_the_command_line_table() {
        let parsed = TrainArgs::try_parse_from(argv(&["train", "-e", "2", "-n", "base"]))
            .expect("parse");
        assert_eq!(parsed.architecture, "set");
        assert_eq!(parsed.gpu, "");
        assert_eq!(parsed.empty_subset_reward, -1);
        assert_eq!(parsed.correct_subset_reward, None);
        let config = parsed.experiment();
        assert_eq!(config.folder_name(), "base_subsetsum_set");
        assert!(config.validate().is_ok());
    }
}
