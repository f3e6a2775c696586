use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

/// Activation applied after every branch convolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    Relu,
    /// Negative slope 0.1.
    #[default]
    LeakyRelu,
    Relu6,
    Gelu,
    Silu,
    Identity,
}

impl ActivationKind {
    pub const LEAKY_SLOPE: f64 = 0.1;

    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            ActivationKind::Relu => activation::relu(x),
            ActivationKind::LeakyRelu => activation::leaky_relu(x, Self::LEAKY_SLOPE),
            ActivationKind::Relu6 => x.clamp(0.0, 6.0),
            ActivationKind::Gelu => activation::gelu(x),
            ActivationKind::Silu => activation::silu(x),
            ActivationKind::Identity => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn run(kind: ActivationKind) -> Vec<f32> {
        let device = Default::default();
        let x = Tensor::<B, 1>::from_floats([-2.0, 0.0, 3.0, 8.0], &device);
        kind.apply(x).into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn leaky_relu_scales_negatives() {
        let out = run(ActivationKind::LeakyRelu);
        assert!((out[0] + 0.2).abs() < 1e-6);
        assert_eq!(&out[1..], &[0.0, 3.0, 8.0]);
    }

    #[test]
    fn relu6_clamps_both_ends() {
        assert_eq!(run(ActivationKind::Relu6), vec![0.0, 0.0, 3.0, 6.0]);
    }

    #[test]
    fn identity_is_passthrough() {
        assert_eq!(run(ActivationKind::Identity), vec![-2.0, 0.0, 3.0, 8.0]);
    }
}
