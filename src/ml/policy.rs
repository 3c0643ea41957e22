use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;

use crate::dataset::ProblemInstance;

use super::encoding::SetEncoder;

pub const DEFAULT_HIDDEN: usize = 128;
pub const DEFAULT_STACK: usize = 2;

#[derive(Config, Debug)]
pub struct PolicyConfig {
    /// Length of the set encoding, also the number of output logits.
    pub universe: usize,
    #[config(default = "DEFAULT_HIDDEN")]
    pub hidden: usize,
    #[config(default = "DEFAULT_STACK")]
    pub depth: usize,
}

impl PolicyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SubsetPolicy<B> {
        SubsetPolicy::new(self.universe, self.hidden, self.depth, device)
    }
}

/// Maps a set encoding to one inclusion logit per universe position.
#[derive(Module, Debug)]
pub struct SubsetPolicy<B: Backend> {
    stack: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> SubsetPolicy<B> {
    pub fn new(universe: usize, hidden: usize, stack_depth: usize, device: &B::Device) -> Self {
        assert!(stack_depth > 0, "stack depth must be positive");
        assert!(universe > 0, "universe must be non-empty");
        let mut stack = Vec::with_capacity(stack_depth);
        let mut input_size = universe;
        for _ in 0..stack_depth {
            stack.push(LinearConfig::new(input_size, hidden).init(device));
            input_size = hidden;
        }
        let output = LinearConfig::new(input_size, universe).init(device);
        Self { stack, output }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut activations = input;
        for layer in &self.stack {
            activations = relu(layer.forward(activations));
        }
        self.output.forward(activations)
    }

    pub fn probabilities(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.forward(input))
    }

    pub fn forward_instances(
        &self,
        instances: &[ProblemInstance],
        device: &B::Device,
    ) -> Tensor<B, 2> {
        self.forward(SetEncoder::encode_tensor::<B>(instances, device))
    }

    /// Every trainable layer, input side first.
    pub fn layers(&self) -> impl Iterator<Item = &Linear<B>> {
        self.stack.iter().chain(std::iter::once(&self.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn forward_emits_one_logit_per_position() {
        let device = Default::default();
        let network = PolicyConfig::new(32).init::<Backend>(&device);
        let instances = vec![
            ProblemInstance::from_integers(&[1, 2, 3, 4, 5], 32).expect("instance"),
            ProblemInstance::from_integers(&[7, 9, 11, 13, 15], 32).expect("instance"),
        ];
        let logits = network.forward_instances(&instances, &device);
        assert_eq!(logits.shape().dims, [2, 32]);
    }

    #[test]
    fn layers_cover_stack_and_output() {
        let network = PolicyConfig::new(8)
            .with_hidden(16)
            .with_depth(3)
            .init::<Backend>(&Default::default());
        assert_eq!(network.layers().count(), 4);
    }
}
