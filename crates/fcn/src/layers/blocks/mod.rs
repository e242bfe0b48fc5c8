//! # Conv Blocks
pub mod conv_act;
pub mod conv_norm;
