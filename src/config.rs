use serde::{Deserialize, Serialize};

use crate::error::{HeadError, Result};
use crate::model::blocks::ActivationKind;

/// Convolution kind used by the per-level branch stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvType {
    /// Plain 3x3 convolution.
    Conv,
    /// Depthwise 3x3 followed by pointwise 1x1.
    DWConv,
}

/// Batch normalization settings. Absent norm means the convolutions carry a bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormConfig {
    BatchNorm { epsilon: f64, momentum: f64 },
}

impl Default for NormConfig {
    fn default() -> Self {
        NormConfig::BatchNorm {
            epsilon: 1e-5,
            momentum: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Standard deviation of the normal draws for every convolution weight.
    pub std: f64,
    /// Prior foreground probability used to derive the classification bias.
    pub bias_prob: f64,
    pub seed: u64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            std: 0.01,
            bias_prob: 0.01,
            seed: 42,
        }
    }
}

/// Distribution focal loss settings, read by the external loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    pub loss_weight: f32,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self { loss_weight: 0.25 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignerConfig {
    /// Candidates kept per level when matching ground truth to locations.
    pub topk: usize,
}

impl Default for AssignerConfig {
    fn default() -> Self {
        Self { topk: 9 }
    }
}

/// Sampling is disabled for this head, every assigned location is used as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerKind {
    #[default]
    Pseudo,
}

/// Training-only collaborators configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub assigner: AssignerConfig,
    #[serde(default)]
    pub sampler: SamplerKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadConfig {
    pub num_classes: usize,
    /// Input channels, shared by every pyramid level.
    pub in_channels: usize,
    pub feat_channels: usize,
    pub stacked_convs: usize,
    pub share_cls_reg: bool,
    pub conv_type: ConvType,
    pub norm: Option<NormConfig>,
    pub activation: ActivationKind,
    pub reg_max: usize,
    pub strides: Vec<usize>,
    pub init: InitConfig,
    pub loss_dfl: LossConfig,
    pub train: Option<TrainConfig>,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            num_classes: 80,
            in_channels: 96,
            feat_channels: 96,
            stacked_convs: 2,
            share_cls_reg: false,
            conv_type: ConvType::DWConv,
            norm: Some(NormConfig::default()),
            activation: ActivationKind::LeakyRelu,
            reg_max: 7,
            strides: vec![8, 16, 32],
            init: InitConfig::default(),
            loss_dfl: LossConfig::default(),
            train: None,
        }
    }
}

impl HeadConfig {
    pub fn new(num_classes: usize, in_channels: usize) -> Self {
        Self {
            num_classes,
            in_channels,
            ..Self::default()
        }
    }

    pub fn with_feat_channels(mut self, feat_channels: usize) -> Self {
        self.feat_channels = feat_channels;
        self
    }

    pub fn with_stacked_convs(mut self, stacked_convs: usize) -> Self {
        self.stacked_convs = stacked_convs;
        self
    }

    pub fn with_share_cls_reg(mut self, share_cls_reg: bool) -> Self {
        self.share_cls_reg = share_cls_reg;
        self
    }

    pub fn with_conv_type(mut self, conv_type: ConvType) -> Self {
        self.conv_type = conv_type;
        self
    }

    pub fn with_norm(mut self, norm: Option<NormConfig>) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_activation(mut self, activation: ActivationKind) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_reg_max(mut self, reg_max: usize) -> Self {
        self.reg_max = reg_max;
        self
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.init.seed = seed;
        self
    }

    pub fn with_train(mut self, train: TrainConfig) -> Self {
        self.train = Some(train);
        self
    }

    /// Bins per box edge.
    pub fn num_bins(&self) -> usize {
        self.reg_max + 1
    }

    /// Channels of the box-distribution output: 4 edges times `reg_max + 1` bins.
    pub fn reg_channels(&self) -> usize {
        4 * self.num_bins()
    }

    /// Channels produced by the classification output convolution.
    pub fn cls_out_channels(&self) -> usize {
        if self.share_cls_reg {
            self.num_classes + self.reg_channels()
        } else {
            self.num_classes
        }
    }

    /// `reg_channels` and `cls_out_channels`, or `None` if either overflows.
    fn checked_channels(&self) -> Option<(usize, usize)> {
        let reg = self.reg_max.checked_add(1)?.checked_mul(4)?;
        let cls = if self.share_cls_reg {
            self.num_classes.checked_add(reg)?
        } else {
            self.num_classes
        };
        Some((reg, cls))
    }

    /// Classification bias giving an initial sigmoid confidence of `init.bias_prob`.
    pub fn cls_bias(&self) -> f64 {
        let p = self.init.bias_prob;
        -((1.0 - p) / p).ln()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(HeadError::invalid_config("num_classes must be > 0"));
        }
        if self.in_channels == 0 || self.feat_channels == 0 {
            return Err(HeadError::invalid_config(format!(
                "in_channels ({}) and feat_channels ({}) must be > 0",
                self.in_channels, self.feat_channels
            )));
        }
        if self.strides.is_empty() {
            return Err(HeadError::invalid_config("strides must not be empty"));
        }
        if let Some(pos) = self.strides.iter().position(|&s| s == 0) {
            return Err(HeadError::invalid_config(format!(
                "stride at level {} is 0",
                pos
            )));
        }
        if self.checked_channels().is_none() {
            return Err(HeadError::invalid_config(format!(
                "reg_max = {} with num_classes = {} overflows the output channel count",
                self.reg_max, self.num_classes
            )));
        }
        // Output convolutions always read feat_channels.
        if self.stacked_convs == 0 && self.in_channels != self.feat_channels {
            return Err(HeadError::invalid_config(format!(
                "stacked_convs = 0 requires in_channels == feat_channels, got {} and {}",
                self.in_channels, self.feat_channels
            )));
        }
        if !(self.init.std > 0.0 && self.init.std.is_finite()) {
            return Err(HeadError::invalid_config(format!(
                "init.std must be positive and finite, got {}",
                self.init.std
            )));
        }
        if !(self.init.bias_prob > 0.0 && self.init.bias_prob < 1.0) {
            return Err(HeadError::invalid_config(format!(
                "init.bias_prob must lie in (0, 1), got {}",
                self.init.bias_prob
            )));
        }
        Ok(())
    }

    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: HeadConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}
