use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;

use super::ActivationKind;
use crate::config::{ConvType, NormConfig};

/// Conv2d, optional BatchNorm, then activation.
#[derive(Module, Debug)]
pub struct ConvNormAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: Option<BatchNorm<B>>,
    activation: Ignored<ActivationKind>,
}

impl<B: Backend> ConvNormAct<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        groups: usize,
        norm: Option<NormConfig>,
        activation: ActivationKind,
    ) -> Self {
        let padding = kernel_size / 2;

        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([1, 1])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(norm.is_none())
                .init(device),
            norm: norm.map(|cfg| match cfg {
                NormConfig::BatchNorm { epsilon, momentum } => BatchNormConfig::new(out_channels)
                    .with_epsilon(epsilon)
                    .with_momentum(momentum)
                    .init(device),
            }),
            activation: Ignored(activation),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.norm {
            Some(bn) => bn.forward(x),
            None => x,
        };
        self.activation.0.apply(x)
    }
}

/// One stage of a branch stack.
///
/// `ConvType::Conv` is a single 3x3 [`ConvNormAct`]. `ConvType::DWConv` is a
/// depthwise 3x3 (groups = in_channels) followed by a pointwise 1x1, each with
/// its own norm and activation.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    depthwise: Option<ConvNormAct<B>>,
    conv: ConvNormAct<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        device: &B::Device,
        conv_type: ConvType,
        in_channels: usize,
        out_channels: usize,
        norm: Option<NormConfig>,
        activation: ActivationKind,
    ) -> Self {
        match conv_type {
            ConvType::Conv => Self {
                depthwise: None,
                conv: ConvNormAct::new(device, in_channels, out_channels, 3, 1, norm, activation),
            },
            ConvType::DWConv => Self {
                depthwise: Some(ConvNormAct::new(
                    device,
                    in_channels,
                    in_channels,
                    3,
                    in_channels,
                    norm,
                    activation,
                )),
                conv: ConvNormAct::new(device, in_channels, out_channels, 1, 1, norm, activation),
            },
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.depthwise {
            Some(dw) => dw.forward(x),
            None => x,
        };
        self.conv.forward(x)
    }

    pub fn is_depthwise(&self) -> bool {
        self.depthwise.is_some()
    }

    /// Convolutions in forward order.
    pub fn convs_mut(&mut self) -> impl Iterator<Item = &mut Conv2d<B>> + '_ {
        self.depthwise
            .iter_mut()
            .map(|dw| &mut dw.conv)
            .chain(std::iter::once(&mut self.conv.conv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray;

    #[test]
    fn keeps_spatial_size() {
        let device = Default::default();
        for conv_type in [ConvType::Conv, ConvType::DWConv] {
            let block = ConvBlock::<B>::new(
                &device,
                conv_type,
                8,
                16,
                Some(NormConfig::default()),
                ActivationKind::LeakyRelu,
            );
            let x = Tensor::<B, 4>::random([2, 8, 10, 12], Distribution::Normal(0.0, 1.0), &device);
            assert_eq!(block.forward(x).dims(), [2, 16, 10, 12]);
        }
    }

    #[test]
    fn depthwise_layout_has_fewer_params() {
        let device = Default::default();
        let standard = ConvBlock::<B>::new(&device, ConvType::Conv, 8, 16, None, ActivationKind::Relu);
        let separable = ConvBlock::<B>::new(&device, ConvType::DWConv, 8, 16, None, ActivationKind::Relu);

        assert!(!standard.is_depthwise());
        assert!(separable.is_depthwise());
        // 3x3x8x16 + bias
        assert_eq!(standard.num_params(), 9 * 8 * 16 + 16);
        // depthwise 3x3x8 + bias, pointwise 8x16 + bias
        assert_eq!(separable.num_params(), 9 * 8 + 8 + 8 * 16 + 16);
    }

    #[test]
    fn bias_only_without_norm() {
        let device = Default::default();
        let mut with_norm = ConvBlock::<B>::new(
            &device,
            ConvType::DWConv,
            4,
            4,
            Some(NormConfig::default()),
            ActivationKind::Relu,
        );
        assert!(with_norm.convs_mut().all(|c| c.bias.is_none()));

        let mut without_norm = ConvBlock::<B>::new(&device, ConvType::DWConv, 4, 4, None, ActivationKind::Relu);
        assert_eq!(without_norm.convs_mut().count(), 2);
        assert!(without_norm.convs_mut().all(|c| c.bias.is_some()));
    }
}
