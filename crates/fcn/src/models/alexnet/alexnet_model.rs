//! # `AlexNet` Feature Backbone
//!
//! The torchvision `AlexNet` feature stack:
//!
//! ```text
//! conv 11x11/4 p2 -> relu -> maxpool 3x3/2     (shallow tap)
//! conv  5x5   p2 -> relu -> maxpool 3x3/2      (mid tap)
//! conv  3x3   p1 -> relu  (x3) -> maxpool 3x3/2 (deep tap)
//! ```
//!
//! The unpadded pools do not divide resolutions evenly, so tap strides
//! are nominal; the FCN head fits score maps by size, not by stride.

use crate::layers::blocks::conv_act::{ConvAct2d, ConvAct2dConfig, ConvAct2dMeta};
use crate::layers::conv_shape::maybe_conv2d_output_resolution;
use crate::models::backbone::{BackboneMeta, FeatureTaps};
use bimm_contracts::{ShapeContract, shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// torchvision `AlexNet` conv widths.
pub const ALEXNET_CHANNELS: [usize; 5] = [64, 192, 384, 256, 256];

/// ``(kernel, stride, padding)`` of the five `AlexNet` convs.
const ALEXNET_CONV_GEOMETRY: [(usize, usize, usize); 5] =
    [(11, 4, 2), (5, 1, 2), (3, 1, 1), (3, 1, 1), (3, 1, 1)];

/// Conv indices after which a pool (and a tap) follows.
const ALEXNET_TAP_AFTER: [usize; 3] = [0, 1, 4];

/// [`AlexNet`] Config.
#[derive(Config, Debug)]
pub struct AlexNetConfig {
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Output widths of the five convs.
    #[config(default = "ALEXNET_CHANNELS")]
    pub channels: [usize; 5],
}

impl Default for AlexNetConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BackboneMeta for AlexNetConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn tap_channels(&self) -> [usize; 3] {
        ALEXNET_TAP_AFTER.map(|idx| self.channels[idx])
    }

    fn tap_strides(&self) -> [usize; 3] {
        [8, 16, 32]
    }

    fn min_input_size(&self) -> usize {
        (1..=1024)
            .find(|&size| self.feature_resolutions([size, size]).is_some())
            .unwrap_or(1024)
    }
}

impl AlexNetConfig {
    /// Predict the resolutions of the ``[shallow, mid, deep]`` taps.
    ///
    /// # Returns
    ///
    /// `None` if the input is too small for the feature stack.
    pub fn feature_resolutions(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[[usize; 2]; 3]> {
        let mut resolution = input_resolution;
        let mut taps = [[0; 2]; 3];
        let mut tap = 0;

        for (idx, (kernel, stride, padding)) in ALEXNET_CONV_GEOMETRY.iter().enumerate() {
            resolution = maybe_conv2d_output_resolution(resolution, *kernel, *stride, *padding, 1)?;
            if ALEXNET_TAP_AFTER.contains(&idx) {
                resolution = maybe_conv2d_output_resolution(resolution, 3, 2, 0, 1)?;
                taps[tap] = resolution;
                tap += 1;
            }
        }
        Some(taps)
    }

    /// The conv configs, in order.
    pub fn conv_configs(&self) -> Vec<ConvAct2dConfig> {
        let mut in_channels = self.in_channels;
        ALEXNET_CONV_GEOMETRY
            .iter()
            .zip(self.channels)
            .map(|((kernel, stride, padding), out_channels)| {
                let config: ConvAct2dConfig =
                    Conv2dConfig::new([in_channels, out_channels], [*kernel, *kernel])
                        .with_stride([*stride, *stride])
                        .with_padding(PaddingConfig2d::Explicit(*padding, *padding))
                        .into();
                in_channels = out_channels;
                config
            })
            .collect()
    }

    /// Initialize an [`AlexNet`] backbone.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> AlexNet<B> {
        AlexNet {
            convs: self
                .conv_configs()
                .into_iter()
                .map(|config| config.init(device))
                .collect(),
            pool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
        }
    }
}

/// `AlexNet` feature backbone.
#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    /// The five conv/relu blocks.
    pub convs: Vec<ConvAct2d<B>>,

    /// The shared 3x3/2 pool.
    pub pool: MaxPool2d,
}

impl<B: Backend> BackboneMeta for AlexNet<B> {
    fn in_channels(&self) -> usize {
        self.convs[0].in_channels()
    }

    fn tap_channels(&self) -> [usize; 3] {
        ALEXNET_TAP_AFTER.map(|idx| self.convs[idx].out_channels())
    }

    fn tap_strides(&self) -> [usize; 3] {
        [8, 16, 32]
    }

    fn min_input_size(&self) -> usize {
        self.to_config().min_input_size()
    }
}

impl<B: Backend> AlexNet<B> {
    /// Recover the [`AlexNetConfig`] from the module structure.
    pub fn to_config(&self) -> AlexNetConfig {
        let mut channels = [0; 5];
        for (idx, conv) in self.convs.iter().enumerate() {
            channels[idx] = conv.out_channels();
        }
        AlexNetConfig::new()
            .with_in_channels(self.in_channels())
            .with_channels(channels)
    }

    /// Run the feature stack, collecting the three taps.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> FeatureTaps<B> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "in_channels",
            "height",
            "width",
        ];
        INPUT_CONTRACT.assert_shape(&input, &[("in_channels", self.in_channels())]);

        let mut taps = Vec::with_capacity(3);
        let mut x = input;
        for (idx, conv) in self.convs.iter().enumerate() {
            x = conv.forward(x);
            if ALEXNET_TAP_AFTER.contains(&idx) {
                x = self.pool.forward(x);
                taps.push(x.clone());
            }
        }

        let Ok([shallow, mid, deep]) = <[Tensor<B, 4>; 3]>::try_from(taps) else {
            unreachable!("backbone collects exactly three taps");
        };
        FeatureTaps { shallow, mid, deep }
    }
}
