//! # `AlexNet`
//!
//! The `AlexNet` feature stack as an FCN backbone; FCN-AlexNet replaces the
//! ``fc6`` / ``fc7`` classifier with 6x6 and 1x1 convolutions.

pub mod alexnet_model;
pub mod pytorch;

pub use alexnet_model::*;
