//! # `FCN` - Fully Convolutional Networks
//!
//! * [`fcn_model`] - the [`Fcn`] meta-architecture; 32s / 16s / 8s skip fusion.
//! * [`backbone`] - backbone family dispatch.
//! * [`head`] - the convolutionalized classifier / compact feature heads.
//! * [`pretrained`] - torchvision backbone weight loading.

pub mod backbone;
pub mod fcn_model;
pub mod head;
pub mod pretrained;

pub use backbone::{Backbone, BackboneConfig};
pub use fcn_model::{Fcn, FcnConfig, FcnVariant};
pub use head::{FcnHead, FcnHeadConfig};
