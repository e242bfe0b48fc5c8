//! # `ResNet`
//!
//! `ResNet` trunks as FCN backbones, with optional dilation for
//! output strides 16 and 8.

pub mod basic_block;
pub mod bottleneck;
pub mod downsample;
pub mod layer_block;
pub mod pytorch;
pub mod residual_block;
pub mod resnet_model;
pub mod util;

pub use resnet_model::{ResNet, ResNetConfig};
