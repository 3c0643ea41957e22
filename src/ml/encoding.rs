use burn::tensor::{Tensor, TensorData, backend::Backend};

use crate::dataset::ProblemInstance;
use crate::error::SubsetError;

/// Turns batches of problem instances into network input.
pub struct SetEncoder;

impl SetEncoder {
    /// Row-major `[batch, universe]` membership features.
    pub fn encode(instances: &[ProblemInstance]) -> Vec<f32> {
        instances
            .iter()
            .flat_map(|instance| instance.bits().iter().map(|bit| f32::from(*bit)))
            .collect()
    }

    pub fn encode_tensor<B: Backend>(
        instances: &[ProblemInstance],
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let universe = instances.first().map(ProblemInstance::universe).unwrap_or(0);
        let data = TensorData::new(Self::encode(instances), [instances.len(), universe]);
        Tensor::<B, 2>::from_data(data, device)
    }
}

/// Binary subset masks, flat and row-major like the encoder output.
pub struct ActionMask;

impl ActionMask {
    pub fn to_tensor<B: Backend>(
        actions: &[u8],
        shape: [usize; 2],
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let values: Vec<f32> = actions.iter().map(|bit| f32::from(*bit)).collect();
        Tensor::<B, 2>::from_data(TensorData::new(values, shape), device)
    }

    /// Includes every element whose probability exceeds one half.
    pub fn greedy(probabilities: &[f32]) -> Vec<u8> {
        probabilities
            .iter()
            .map(|probability| u8::from(*probability > 0.5))
            .collect()
    }
}

/// Reads a tensor back to host memory as `f32` values.
pub fn tensor_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<Vec<f32>, SubsetError> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|err| SubsetError::Tensor(format!("{err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn encoder_preserves_batch_layout() {
        let first = ProblemInstance::from_integers(&[1, 3], 4).expect("instance");
        let second = ProblemInstance::from_integers(&[4], 4).expect("instance");
        let encoded = SetEncoder::encode(&[first.clone(), second.clone()]);
        assert_eq!(encoded, vec![1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

        let tensor = SetEncoder::encode_tensor::<Backend>(&[first, second], &Default::default());
        assert_eq!(tensor.shape().dims, [2, 4]);
    }

    #[test]
    fn greedy_mask_thresholds_at_one_half() {
        assert_eq!(ActionMask::greedy(&[0.1, 0.5, 0.51, 0.9]), vec![0, 0, 1, 1]);
    }

    #[test]
    fn action_tensor_round_trips_values() {
        let tensor = ActionMask::to_tensor::<Backend>(&[1, 0, 0, 1], [2, 2], &Default::default());
        let values = tensor_values(tensor).expect("values");
        assert_eq!(values, vec![1.0, 0.0, 0.0, 1.0]);
    }
}
