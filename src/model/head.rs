use burn::module::Ignored;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

use super::blocks::Integral;
use super::init::{init_level, WeightInitReport};
use super::level::LevelHead;
use super::{DenseHead, ExportOutput, HeadOutput};
use crate::config::{AssignerConfig, HeadConfig, LossConfig, SamplerKind, TrainConfig};
use crate::error::{HeadError, Result};

/// Anchor-free multi-level head predicting class scores and per-edge
/// distance distributions.
///
/// Owns one [`LevelHead`] per configured stride, in stride order. Levels share
/// no parameters.
#[derive(Module, Debug)]
pub struct NanoDetHead<B: Backend> {
    levels: Vec<LevelHead<B>>,
    integral: Ignored<Integral>,
    config: Ignored<HeadConfig>,
}

impl HeadConfig {
    /// Validate the configuration and build the head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<NanoDetHead<B>> {
        self.validate()?;

        let levels = self
            .strides
            .iter()
            .map(|_| LevelHead::new(device, self))
            .collect::<Result<Vec<_>>>()?;

        log::info!("NanoDetHead init:");
        log::info!(
            "  num_classes = {}, in_channels = {}, feat_channels = {}",
            self.num_classes,
            self.in_channels,
            self.feat_channels
        );
        log::info!(
            "  stacked_convs = {}, conv_type = {:?}, activation = {:?}, norm = {:?}",
            self.stacked_convs,
            self.conv_type,
            self.activation,
            self.norm
        );
        log::info!(
            "  strides = {:?}, reg_max = {}, share_cls_reg = {}",
            self.strides,
            self.reg_max,
            self.share_cls_reg
        );
        if let Some(train) = &self.train {
            log::info!("  assigner topk = {}, sampler = {:?}", train.assigner.topk, train.sampler);
        }

        Ok(NanoDetHead {
            levels,
            integral: Ignored(Integral::new(self.reg_max)),
            config: Ignored(self.clone()),
        })
    }
}

impl<B: Backend> NanoDetHead<B> {
    pub fn config(&self) -> &HeadConfig {
        &self.config.0
    }

    pub fn levels(&self) -> &[LevelHead<B>] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Decoder shared by loss computation and inference.
    pub fn integral(&self) -> Integral {
        self.integral.0
    }

    pub fn loss_dfl(&self) -> &LossConfig {
        &self.config.0.loss_dfl
    }

    pub fn train_config(&self) -> Option<&TrainConfig> {
        self.config.0.train.as_ref()
    }

    pub fn assigner(&self) -> Option<&AssignerConfig> {
        self.train_config().map(|t| &t.assigner)
    }

    pub fn sampler(&self) -> Option<SamplerKind> {
        self.train_config().map(|t| t.sampler)
    }

    fn check_inputs(&self, feats: &[Tensor<B, 4>]) -> Result<()> {
        let config = self.config();
        if feats.len() != self.levels.len() {
            return Err(HeadError::LevelCountMismatch {
                expected: self.levels.len(),
                actual: feats.len(),
            });
        }
        for (level, (x, &stride)) in feats.iter().zip(&config.strides).enumerate() {
            let [_, c, _, _] = x.dims();
            if c != config.in_channels {
                return Err(HeadError::LevelChannelMismatch {
                    level,
                    stride,
                    expected: config.in_channels,
                    actual: c,
                });
            }
        }
        Ok(())
    }

    /// Raw per-level outputs in `[B, C, H, W]` layout, for assignment and loss.
    pub fn forward_train(&self, feats: Vec<Tensor<B, 4>>) -> Result<HeadOutput<B>> {
        self.check_inputs(&feats)?;

        let (cls_scores, bbox_preds): (Vec<_>, Vec<_>) = feats
            .into_iter()
            .zip(&self.levels)
            .map(|(x, level)| level.forward(x))
            .unzip();

        for (i, (cls, reg)) in cls_scores.iter().zip(&bbox_preds).enumerate() {
            log::debug!(
                "  level {} (stride {}): cls_score {:?}, bbox_pred {:?}",
                i,
                self.config().strides[i],
                cls.dims(),
                reg.dims()
            );
        }

        Ok(HeadOutput {
            cls_scores,
            bbox_preds,
        })
    }

    /// Flattened, channel-last outputs for a single image: class scores after
    /// sigmoid as `[1, H*W, num_classes]`, box logits as `[1, H*W, 4*(reg_max+1)]`.
    pub fn forward_export(&self, feats: Vec<Tensor<B, 4>>) -> Result<ExportOutput<B>> {
        self.check_inputs(&feats)?;
        if let Some((level, batch)) = feats
            .iter()
            .map(|x| x.dims()[0])
            .enumerate()
            .find(|&(_, batch)| batch != 1)
        {
            return Err(HeadError::ExportBatch { level, batch });
        }

        let (cls_scores, bbox_preds): (Vec<_>, Vec<_>) = feats
            .into_iter()
            .zip(&self.levels)
            .map(|(x, level)| {
                let (cls, reg) = level.forward(x);
                let [_, nc, h, w] = cls.dims();
                let [_, nr, _, _] = reg.dims();
                let cls = sigmoid(cls).reshape([1, nc, h * w]).swap_dims(1, 2);
                let reg = reg.reshape([1, nr, h * w]).swap_dims(1, 2);
                (cls, reg)
            })
            .unzip();

        for (i, (cls, reg)) in cls_scores.iter().zip(&bbox_preds).enumerate() {
            log::debug!(
                "  export level {} (stride {}): cls_score {:?}, bbox_pred {:?}",
                i,
                self.config().strides[i],
                cls.dims(),
                reg.dims()
            );
        }

        Ok(ExportOutput {
            cls_scores,
            bbox_preds,
        })
    }

    /// Re-draws every convolution with the configured seed.
    pub fn init_weights(&mut self) -> Result<WeightInitReport> {
        let seed = self.config().init.seed;
        self.init_weights_with_seed(seed)
    }

    pub fn init_weights_with_seed(&mut self, seed: u64) -> Result<WeightInitReport> {
        let std = self.config().init.std as f32;
        let cls_bias = self.config().cls_bias();
        let normal = Normal::new(0.0, std)
            .map_err(|e| HeadError::invalid_config(format!("init.std {}: {}", std, e)))?;
        let mut rng = StdRng::seed_from_u64(seed);

        let convs_initialized: usize = self
            .levels
            .iter_mut()
            .map(|level| init_level(level, &normal, cls_bias, &mut rng))
            .sum();

        let report = WeightInitReport {
            levels: self.levels.len(),
            convs_initialized,
            cls_bias,
            seed,
        };
        log::info!(
            "Finished initializing NanoDetHead: {} convs over {} levels, cls bias {:.3}, seed {}",
            report.convs_initialized,
            report.levels,
            report.cls_bias,
            report.seed
        );
        Ok(report)
    }
}

impl<B: Backend> DenseHead<B> for NanoDetHead<B> {
    fn strides(&self) -> &[usize] {
        &self.config().strides
    }

    fn num_classes(&self) -> usize {
        self.config().num_classes
    }

    fn reg_max(&self) -> usize {
        self.config().reg_max
    }

    fn forward_train(&self, feats: Vec<Tensor<B, 4>>) -> Result<HeadOutput<B>> {
        NanoDetHead::forward_train(self, feats)
    }

    fn forward_export(&self, feats: Vec<Tensor<B, 4>>) -> Result<ExportOutput<B>> {
        NanoDetHead::forward_export(self, feats)
    }

    fn init_weights(&mut self) -> Result<WeightInitReport> {
        NanoDetHead::init_weights(self)
    }
}
