#![warn(missing_docs)]
//!# fcn - Fully Convolutional Networks for Burn
//!
//! Dense, per-pixel classifiers built by convolutionalizing classic image
//! classifiers, after Long, Shelhamer and Darrell.
//!
//! ## Notable Components
//!
//! * [`cache`] - pretrained weight download cache and prefab registries.
//! * [`data`] - segmentation items, a synthetic shapes dataset, batching and image I/O.
//! * [`io`] - ``PyTorch`` weight file loading.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - ``Conv2d + BatchNorm2d (+ ReLU + Dropout)`` blocks.
//!   * [`layers::upsample`] - bilinear-initialized transposed conv upsampling.
//!   * [`layers::convolutionalize`] - ``Linear`` to ``Conv2d`` conversion.
//! * [`models`] - complete model families.
//!   * [`models::alexnet`], [`models::vgg`], [`models::resnet`] - backbones.
//!   * [`models::fcn`] - FCN-32s / 16s / 8s.
//!   * [`models::prefabs`] - named FCN configs with pretrained backbones.
//! * [`segmentation`] - per-pixel loss, evaluation metrics and training glue.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod cache;
pub mod data;
pub mod io;
pub mod layers;
pub mod models;
pub mod segmentation;
