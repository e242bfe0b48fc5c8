//! # Model Families
//!
//! * [`backbone`] - the feature tap API shared by all backbones.
//! * [`alexnet`], [`vgg`], [`resnet`] - backbone families.
//! * [`fcn`] - the FCN meta-architecture.
//! * [`prefabs`] - well-known FCN configs and their pretrained weights.

pub mod alexnet;
pub mod backbone;
pub mod fcn;
pub mod prefabs;
pub mod resnet;
pub mod vgg;
