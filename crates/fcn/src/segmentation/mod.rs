//! # Semantic Segmentation
//!
//! * [`loss`] - masked per-pixel cross entropy.
//! * [`metrics`] - the confusion matrix and the FCN evaluation scores.
//! * [`training`] - burn learner integration for [`crate::models::fcn::Fcn`].

pub mod loss;
pub mod metrics;
pub mod training;

pub use loss::{flatten_labels, flatten_pixels, pixel_cross_entropy};
pub use metrics::ConfusionMatrix;
