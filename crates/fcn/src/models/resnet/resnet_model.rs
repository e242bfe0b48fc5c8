//! # `ResNet` Feature Backbone
//!
//! The torchvision `ResNet` trunk with the classifier removed:
//!
//! ```text
//! conv 7x7/2 -> bn -> relu -> maxpool 3x3/2   (stride 4)
//! layer1                                      (stride 4)
//! layer2                                      (stride 8;  shallow tap)
//! layer3                                      (stride 16; mid tap)
//! layer4                                      (stride 32; deep tap)
//! ```
//!
//! An output stride of 16 or 8 replaces the stride of ``layer4`` (and
//! ``layer3``) with dilation, keeping the pretrained receptive fields.

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::backbone::{BackboneMeta, FeatureTaps};
use crate::models::resnet::bottleneck::BOTTLENECK_EXPANSION;
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::util::{RESNET_OUTPUT_STRIDES, layer_stride_schedule};
use bimm_contracts::{ShapeContract, shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// Base widths of ``layer1`` .. ``layer4``.
pub const RESNET_LAYER_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Width of the ``conv1`` stem.
pub const RESNET_STEM_PLANES: usize = 64;

/// [`ResNet`] Config.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of blocks in each of the four layers.
    pub layers: [usize; 4],

    /// Use bottleneck blocks.
    #[config(default = false)]
    pub bottleneck: bool,

    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Stride of the deepest tap; one of 8, 16, 32.
    #[config(default = 32)]
    pub output_stride: usize,
}

impl ResNetConfig {
    /// `ResNet-18`.
    pub fn resnet18() -> Self {
        Self::new([2, 2, 2, 2])
    }

    /// `ResNet-34`.
    pub fn resnet34() -> Self {
        Self::new([3, 4, 6, 3])
    }

    /// `ResNet-50`.
    pub fn resnet50() -> Self {
        Self::new([3, 4, 6, 3]).with_bottleneck(true)
    }

    /// `ResNet-101`.
    pub fn resnet101() -> Self {
        Self::new([3, 4, 23, 3]).with_bottleneck(true)
    }

    /// `ResNet-152`.
    pub fn resnet152() -> Self {
        Self::new([3, 8, 36, 3]).with_bottleneck(true)
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if !RESNET_OUTPUT_STRIDES.contains(&self.output_stride) {
            return Err(format!(
                "output_stride must be one of {:?}, found {}",
                RESNET_OUTPUT_STRIDES, self.output_stride
            ));
        }
        if let Some(idx) = self.layers.iter().position(|&n| n == 0) {
            return Err(format!("layer{} has no blocks", idx + 1));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    fn expansion(&self) -> usize {
        if self.bottleneck {
            BOTTLENECK_EXPANSION
        } else {
            1
        }
    }

    /// The configs of ``layer1`` .. ``layer4``.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn layer_configs(&self) -> Vec<LayerBlockConfig> {
        self.expect_valid();
        let schedule = layer_stride_schedule(self.output_stride)
            .unwrap_or_else(|| unreachable!("validated output stride"));

        let mut in_planes = RESNET_STEM_PLANES;
        let mut prev_dilation = 1;
        schedule
            .iter()
            .zip(RESNET_LAYER_PLANES)
            .zip(self.layers)
            .map(|((&(stride, dilation), planes), num_blocks)| {
                let layer = LayerBlockConfig::build(
                    num_blocks,
                    in_planes,
                    planes,
                    stride,
                    prev_dilation,
                    dilation,
                    self.bottleneck,
                );
                in_planes = layer.out_planes();
                prev_dilation = dilation;
                layer
            })
            .collect()
    }

    /// Initialize a [`ResNet`] backbone.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        let stem: ConvNorm2dConfig =
            Conv2dConfig::new([self.in_channels, RESNET_STEM_PLANES], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .into();

        ResNet {
            input_conv_norm: stem.init(device),
            act: Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layers: self
                .layer_configs()
                .iter()
                .map(|layer| layer.init(device))
                .collect(),
        }
    }
}

impl BackboneMeta for ResNetConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn tap_channels(&self) -> [usize; 3] {
        let e = self.expansion();
        [
            RESNET_LAYER_PLANES[1] * e,
            RESNET_LAYER_PLANES[2] * e,
            RESNET_LAYER_PLANES[3] * e,
        ]
    }

    fn tap_strides(&self) -> [usize; 3] {
        let os = self.output_stride;
        [8.min(os), 16.min(os), os]
    }

    fn min_input_size(&self) -> usize {
        self.output_stride
    }
}

/// `ResNet` feature backbone.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// ``conv1`` / ``bn1`` stem.
    pub input_conv_norm: ConvNorm2d<B>,

    /// Stem activation.
    pub act: Relu,

    /// Stem pool.
    pub maxpool: MaxPool2d,

    /// ``layer1`` .. ``layer4``.
    pub layers: Vec<LayerBlock<B>>,
}

impl<B: Backend> BackboneMeta for ResNet<B> {
    fn in_channels(&self) -> usize {
        self.input_conv_norm.in_channels()
    }

    fn tap_channels(&self) -> [usize; 3] {
        [
            self.layers[1].out_planes(),
            self.layers[2].out_planes(),
            self.layers[3].out_planes(),
        ]
    }

    fn tap_strides(&self) -> [usize; 3] {
        self.to_config().tap_strides()
    }

    fn min_input_size(&self) -> usize {
        self.to_config().min_input_size()
    }
}

impl<B: Backend> ResNet<B> {
    /// Recover the [`ResNetConfig`] from the module structure.
    pub fn to_config(&self) -> ResNetConfig {
        let output_stride = self.input_conv_norm.stride()[0]
            * 2
            * self.layers.iter().map(|l| l.stride()).product::<usize>();

        let mut layers = [0; 4];
        for (n, layer) in layers.iter_mut().zip(&self.layers) {
            *n = layer.len();
        }

        ResNetConfig::new(layers)
            .with_bottleneck(self.layers[0].blocks[0].is_bottleneck())
            .with_in_channels(self.in_channels())
            .with_output_stride(output_stride)
    }

    /// Run the trunk, collecting the ``layer2`` .. ``layer4`` outputs.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``;
    ///   ``height`` and ``width`` must be multiples of the output stride.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> FeatureTaps<B> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "in_channels",
            "height" = "h" * "output_stride",
            "width" = "w" * "output_stride",
        ];
        INPUT_CONTRACT.assert_shape(
            &input,
            &[
                ("in_channels", self.in_channels()),
                ("output_stride", self.size_divisor())
            ],
        );

        let x = self.input_conv_norm.forward(input);
        let x = self.act.forward(x);
        let x = self.maxpool.forward(x);

        let x = self.layers[0].forward(x);
        let shallow = self.layers[1].forward(x);
        let mid = self.layers[2].forward(shallow.clone());
        let deep = self.layers[3].forward(mid.clone());

        FeatureTaps { shallow, mid, deep }
    }

    /// The largest block dilation of each layer.
    pub fn layer_dilations(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.dilation()).collect()
    }
}
