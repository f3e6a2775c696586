pub mod activation;
pub mod conv;
pub mod integral;

pub use activation::ActivationKind;
pub use conv::{ConvBlock, ConvNormAct};
pub use integral::Integral;
