//! # `VGG`
//!
//! `VGG` feature stacks as FCN backbones; the FCN-VGG papers use `VGG-16`.

pub mod pytorch;
pub mod vgg_model;

pub use vgg_model::*;
