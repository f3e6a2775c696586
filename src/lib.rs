pub mod config;
pub mod error;
pub mod model;

// Re-exports for convenience
pub use config::{
    AssignerConfig, ConvType, HeadConfig, InitConfig, LossConfig, NormConfig, SamplerKind, TrainConfig,
};
pub use error::{HeadError, Result};
pub use model::{
    ActivationKind, DenseHead, ExportOutput, HeadOutput, Integral, LevelHead, NanoDetHead, WeightInitReport,
};
