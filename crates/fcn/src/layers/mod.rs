//! Common low-level modules and operations for FCN heads and backbones.
pub mod align;
pub mod blocks;
pub mod conv_shape;
pub mod convolutionalize;
pub mod upsample;
