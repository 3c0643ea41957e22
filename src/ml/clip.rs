//! Global L2 gradient-norm clipping over every parameter of a [`SubsetPolicy`].
//!
//! Burn's optimizer-level clipping works per parameter tensor; these helpers
//! bound the norm of the concatenated gradient instead.

use burn::module::ParamId;
use burn::optim::GradientsParams;
use burn::tensor::Tensor;
use burn::tensor::backend::{AutodiffBackend, Backend};

use super::encoding::tensor_values;
use super::policy::SubsetPolicy;
use crate::error::SubsetError;

const CLIP_EPSILON: f32 = 1.0e-6;

/// L2 norm of all gradients registered for the policy's parameters.
pub fn global_grad_norm<B: AutodiffBackend>(
    model: &SubsetPolicy<B>,
    grads: &GradientsParams,
) -> Result<f32, SubsetError> {
    let mut total = 0.0f32;
    for layer in model.layers() {
        total += squared_norm::<B::InnerBackend, 2>(grads, layer.weight.id)?;
        if let Some(bias) = &layer.bias {
            total += squared_norm::<B::InnerBackend, 1>(grads, bias.id)?;
        }
    }
    Ok(total.sqrt())
}

/// Rescales the gradients so their global norm is at most `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_grad_norm<B: AutodiffBackend>(
    model: &SubsetPolicy<B>,
    grads: &mut GradientsParams,
    max_norm: f32,
) -> Result<f32, SubsetError> {
    let norm = global_grad_norm(model, grads)?;
    let scale = max_norm / (norm + CLIP_EPSILON);
    if scale < 1.0 {
        for layer in model.layers() {
            rescale::<B::InnerBackend, 2>(grads, layer.weight.id, scale);
            if let Some(bias) = &layer.bias {
                rescale::<B::InnerBackend, 1>(grads, bias.id, scale);
            }
        }
    }
    Ok(norm)
}

fn squared_norm<B: Backend, const D: usize>(
    grads: &GradientsParams,
    id: ParamId,
) -> Result<f32, SubsetError> {
    let Some(grad) = grads.get::<B, D>(id) else {
        return Ok(0.0);
    };
    let squared: Tensor<B, 1> = (grad.clone() * grad).sum();
    Ok(tensor_values(squared)?.into_iter().sum())
}

fn rescale<B: Backend, const D: usize>(grads: &mut GradientsParams, id: ParamId, scale: f32) {
    if let Some(grad) = grads.remove::<B, D>(id) {
        grads.register::<B, D>(id, grad.mul_scalar(scale));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::policy::PolicyConfig;
    use burn::tensor::{Distribution, Tensor};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type Backend = Autodiff<NdArray<f32>>;

    fn exploding_grads(model: &SubsetPolicy<Backend>) -> GradientsParams {
        let device = Default::default();
        let input = Tensor::<Backend, 2>::random([4, 8], Distribution::Uniform(0.0, 1.0), &device);
        let loss = model.forward(input).sum().mul_scalar(1.0e4);
        GradientsParams::from_grads(loss.backward(), model)
    }

    #[test]
    fn clipping_bounds_global_norm() {
        let model = PolicyConfig::new(8)
            .with_hidden(16)
            .init::<Backend>(&Default::default());
        let mut grads = exploding_grads(&model);
        let before = clip_grad_norm(&model, &mut grads, 2.0).expect("clip");
        assert!(before > 2.0);
        let after = global_grad_norm(&model, &grads).expect("norm");
        assert!(after <= 2.0 + 1.0e-3, "post-clip norm {after}");
        assert!(after > 1.9);
    }

    #[test]
    fn small_gradients_are_untouched() {
        let model = PolicyConfig::new(8)
            .with_hidden(16)
            .init::<Backend>(&Default::default());
        let mut grads = exploding_grads(&model);
        let before = global_grad_norm(&model, &grads).expect("norm");
        clip_grad_norm(&model, &mut grads, before * 2.0).expect("clip");
        let after = global_grad_norm(&model, &grads).expect("norm");
        assert!((after - before).abs() <= before * 1.0e-5);
    }
}
