use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;

use super::branch::{build_branches, ConvStack};
use crate::config::HeadConfig;
use crate::error::{HeadError, Result};

/// Regression stack and its 1x1 projection. Absent in shared mode.
#[derive(Module, Debug)]
pub struct RegBranch<B: Backend> {
    pub convs: ConvStack<B>,
    pub gfl_reg: Conv2d<B>,
}

/// Branch stacks and output projections for a single pyramid level.
#[derive(Module, Debug)]
pub struct LevelHead<B: Backend> {
    pub cls_convs: ConvStack<B>,
    /// Classification projection; in shared mode it also carries the box logits.
    pub gfl_cls: Conv2d<B>,
    pub reg: Option<RegBranch<B>>,
    num_classes: usize,
    reg_channels: usize,
}

fn projection<B: Backend>(device: &B::Device, in_channels: usize, out_channels: usize) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1])
        .with_stride([1, 1])
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .init(device)
}

fn out_channels<B: Backend>(conv: &Conv2d<B>) -> usize {
    conv.weight.val().dims()[0]
}

fn ensure_out_channels<B: Backend>(what: &str, conv: &Conv2d<B>, expected: usize) -> Result<()> {
    let actual = out_channels(conv);
    if actual != expected {
        return Err(HeadError::ChannelMismatch {
            what: what.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

impl<B: Backend> LevelHead<B> {
    pub fn new(device: &B::Device, config: &HeadConfig) -> Result<Self> {
        let reg_channels = config.reg_channels();
        let (cls_convs, reg_convs) = build_branches(device, config);

        let gfl_cls = projection(device, config.feat_channels, config.cls_out_channels());
        let reg = reg_convs.map(|convs| RegBranch {
            convs,
            gfl_reg: projection(device, config.feat_channels, reg_channels),
        });

        let level = Self {
            cls_convs,
            gfl_cls,
            reg,
            num_classes: config.num_classes,
            reg_channels,
        };
        level.check_layout()?;
        Ok(level)
    }

    /// Checks the projections against the class and bin counts the forward
    /// split relies on. Projections are public and can be swapped, e.g. by
    /// loading a record, so this is not implied by construction.
    pub fn check_layout(&self) -> Result<()> {
        let fused = if self.is_shared() { self.reg_channels } else { 0 };
        ensure_out_channels("gfl_cls", &self.gfl_cls, self.num_classes + fused)?;
        if let Some(reg) = &self.reg {
            ensure_out_channels("gfl_reg", &reg.gfl_reg, self.reg_channels)?;
        }
        Ok(())
    }

    pub fn is_shared(&self) -> bool {
        self.reg.is_none()
    }

    /// Raw `(cls_score, bbox_pred)` in `[B, C, H, W]` layout.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        match &self.reg {
            Some(reg) => {
                let cls_score = self.gfl_cls.forward(self.cls_convs.forward(x.clone()));
                let bbox_pred = reg.gfl_reg.forward(reg.convs.forward(x));
                (cls_score, bbox_pred)
            }
            None => {
                let feat = self.gfl_cls.forward(self.cls_convs.forward(x));
                let cls_score = feat.clone().narrow(1, 0, self.num_classes);
                let bbox_pred = feat.narrow(1, self.num_classes, self.reg_channels);
                (cls_score, bbox_pred)
            }
        }
    }
}
