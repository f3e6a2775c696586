use burn::nn::conv::Conv2d;
use burn::prelude::*;

use crate::config::HeadConfig;
use crate::model::blocks::ConvBlock;

/// A stack of `stacked_convs` 3x3 blocks for one pyramid level.
#[derive(Module, Debug)]
pub struct ConvStack<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> ConvStack<B> {
    /// The first block reads `in_channels`, every later one `feat_channels`.
    pub fn new(device: &B::Device, config: &HeadConfig) -> Self {
        let blocks = (0..config.stacked_convs)
            .map(|i| {
                let chn = if i == 0 {
                    config.in_channels
                } else {
                    config.feat_channels
                };
                ConvBlock::new(
                    device,
                    config.conv_type,
                    chn,
                    config.feat_channels,
                    config.norm,
                    config.activation,
                )
            })
            .collect();

        Self { blocks }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn convs_mut(&mut self) -> impl Iterator<Item = &mut Conv2d<B>> + '_ {
        self.blocks.iter_mut().flat_map(|block| block.convs_mut())
    }
}

/// Classification stack plus, unless `share_cls_reg`, an independent
/// regression stack of the same shape.
pub fn build_branches<B: Backend>(
    device: &B::Device,
    config: &HeadConfig,
) -> (ConvStack<B>, Option<ConvStack<B>>) {
    let cls_convs = ConvStack::new(device, config);
    let reg_convs = if config.share_cls_reg {
        None
    } else {
        Some(ConvStack::new(device, config))
    };
    (cls_convs, reg_convs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvType;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn builds_requested_depth() {
        let device = Default::default();
        let config = HeadConfig::new(4, 16)
            .with_feat_channels(8)
            .with_stacked_convs(3)
            .with_conv_type(ConvType::Conv);
        let (cls, reg) = build_branches::<B>(&device, &config);
        assert_eq!(cls.len(), 3);
        assert_eq!(reg.map(|r| r.len()), Some(3));

        let x = Tensor::<B, 4>::ones([1, 16, 5, 7], &device);
        assert_eq!(cls.forward(x).dims(), [1, 8, 5, 7]);
    }

    #[test]
    fn shared_mode_skips_regression_stack() {
        let device = Default::default();
        let config = HeadConfig::new(4, 16).with_share_cls_reg(true);
        let (cls, reg) = build_branches::<B>(&device, &config);
        assert_eq!(cls.len(), 2);
        assert!(reg.is_none());
    }

    #[test]
    fn zero_depth_is_identity() {
        let device = Default::default();
        let config = HeadConfig::new(4, 8).with_feat_channels(8).with_stacked_convs(0);
        let (cls, _) = build_branches::<B>(&device, &config);
        assert!(cls.is_empty());
        let x = Tensor::<B, 4>::ones([1, 8, 3, 3], &device);
        let out = cls.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, x.into_data().to_vec::<f32>().unwrap());
    }
}
