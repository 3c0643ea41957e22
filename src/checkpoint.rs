use std::fs;
use std::path::Path;

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::SubsetError;
use crate::ml::policy::{PolicyConfig, SubsetPolicy};

pub const CHECKPOINT_FILE: &str = "model.bin";

type PolicyRecord<B> = <SubsetPolicy<B> as Module<B>>::Record;

/// Run details stored alongside the network weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub name: String,
    pub architecture: String,
    pub universe: usize,
    pub hidden: usize,
    pub depth: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub target: u32,
    pub final_reward: Option<f32>,
    pub final_loss: Option<f32>,
}

impl PolicyMetadata {
    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig::new(self.universe)
            .with_hidden(self.hidden)
            .with_depth(self.depth)
    }
}

#[derive(Serialize, Deserialize)]
struct PolicyCheckpoint {
    metadata: PolicyMetadata,
    weights: Vec<u8>,
}

pub fn save_checkpoint<B: Backend>(
    path: &Path,
    model: SubsetPolicy<B>,
    metadata: PolicyMetadata,
) -> Result<(), SubsetError> {
    let record: PolicyRecord<B> = model.into_record();
    let weights = BinBytesRecorder::<FullPrecisionSettings>::new().record(record, ())?;
    let checkpoint = PolicyCheckpoint { metadata, weights };
    let bytes = bincode::serde::encode_to_vec(&checkpoint, bincode::config::standard())?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(PolicyMetadata, SubsetPolicy<B>), SubsetError> {
    let bytes = fs::read(path)?;
    let (checkpoint, _): (PolicyCheckpoint, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    let record: PolicyRecord<B> = BinBytesRecorder::<FullPrecisionSettings>::new()
        .load(checkpoint.weights, device)?;
    let model = checkpoint
        .metadata
        .policy_config()
        .init::<B>(device)
        .load_record(record);
    Ok((checkpoint.metadata, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ProblemInstance;
    use crate::ml::encoding::tensor_values;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn metadata() -> PolicyMetadata {
        PolicyMetadata {
            name: "unit".to_string(),
            architecture: "set".to_string(),
            universe: 16,
            hidden: 8,
            depth: 1,
            epochs: 0,
            learning_rate: 1.0e-4,
            seed: 1,
            target: 10,
            final_reward: None,
            final_loss: None,
        }
    }

    #[test]
    fn checkpoint_restores_weights_and_metadata() {
        let device = Default::default();
        let model = metadata().policy_config().init::<Backend>(&device);
        let instance = ProblemInstance::from_integers(&[1, 5, 9], 16).expect("instance");
        let before = tensor_values(model.forward_instances(&[instance.clone()], &device))
            .expect("values");

        let dir =
            std::env::temp_dir().join(format!("set2subset-checkpoint-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join(CHECKPOINT_FILE);
        save_checkpoint(&path, model, metadata()).expect("save");

        let (restored_meta, restored) = load_checkpoint::<Backend>(&path, &device).expect("load");
        assert_eq!(restored_meta, metadata());
        let after =
            tensor_values(restored.forward_instances(&[instance], &device)).expect("values");
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-6);
        }
        fs::remove_dir_all(&dir).ok();
    }
}
