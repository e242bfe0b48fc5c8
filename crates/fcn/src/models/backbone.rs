//! # Backbone Feature Taps
//!
//! Every FCN backbone exposes three feature taps, from shallow to deep.
//! For the classic families these sit at nominal strides 8, 16 and 32
//! (``pool3`` / ``pool4`` / ``pool5`` in `VGG` terms); FCN-16s and FCN-8s
//! fuse class scores predicted from the shallower taps.

use burn::prelude::{Backend, Tensor};

/// Feature maps tapped from a backbone forward pass.
#[derive(Debug, Clone)]
pub struct FeatureTaps<B: Backend> {
    /// The shallowest tap; nominal stride 8.
    pub shallow: Tensor<B, 4>,

    /// The middle tap; nominal stride 16.
    pub mid: Tensor<B, 4>,

    /// The deepest tap; nominal stride 32.
    pub deep: Tensor<B, 4>,
}

/// Backbone Meta API.
///
/// Shared by backbone configs and backbone modules.
pub trait BackboneMeta {
    /// Number of input image channels.
    fn in_channels(&self) -> usize;

    /// Channels of the ``[shallow, mid, deep]`` taps.
    fn tap_channels(&self) -> [usize; 3];

    /// Nominal strides of the ``[shallow, mid, deep]`` taps.
    fn tap_strides(&self) -> [usize; 3];

    /// Inputs are padded to a multiple of this before the forward pass.
    fn size_divisor(&self) -> usize {
        self.tap_strides()[2]
    }

    /// The smallest input resolution the backbone accepts.
    fn min_input_size(&self) -> usize;
}
