pub mod blocks;
pub mod branch;
pub mod head;
pub mod init;
pub mod level;

use burn::prelude::*;

use crate::error::Result;

pub use blocks::{ActivationKind, Integral};
pub use branch::ConvStack;
pub use head::NanoDetHead;
pub use init::WeightInitReport;
pub use level::LevelHead;

/// Raw per-level predictions, `[B, C, H, W]`, in stride order.
#[derive(Debug, Clone)]
pub struct HeadOutput<B: Backend> {
    /// `[B, num_classes, H, W]` logits.
    pub cls_scores: Vec<Tensor<B, 4>>,
    /// `[B, 4 * (reg_max + 1), H, W]` distribution logits.
    pub bbox_preds: Vec<Tensor<B, 4>>,
}

/// Flattened single-image predictions, `[1, H*W, C]`, in stride order.
#[derive(Debug, Clone)]
pub struct ExportOutput<B: Backend> {
    /// Sigmoid confidences.
    pub cls_scores: Vec<Tensor<B, 3>>,
    /// Unactivated distribution logits.
    pub bbox_preds: Vec<Tensor<B, 3>>,
}

impl<B: Backend> HeadOutput<B> {
    pub fn num_levels(&self) -> usize {
        self.cls_scores.len()
    }
}

impl<B: Backend> ExportOutput<B> {
    pub fn num_levels(&self) -> usize {
        self.cls_scores.len()
    }
}

/// What a training or inference driver needs from a dense detection head.
///
/// Label assignment, losses and box decoding take this as a dependency rather
/// than a concrete head type.
pub trait DenseHead<B: Backend> {
    fn strides(&self) -> &[usize];

    fn num_classes(&self) -> usize;

    fn reg_max(&self) -> usize;

    fn forward_train(&self, feats: Vec<Tensor<B, 4>>) -> Result<HeadOutput<B>>;

    fn forward_export(&self, feats: Vec<Tensor<B, 4>>) -> Result<ExportOutput<B>>;

    fn init_weights(&mut self) -> Result<WeightInitReport>;
}
