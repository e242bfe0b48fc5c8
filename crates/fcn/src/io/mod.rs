//! # Model Weight I/O
pub mod pytorch;
