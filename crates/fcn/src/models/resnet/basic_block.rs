//! # Basic Block for `ResNet`
//!
//! Two 3x3 conv/norm layers and a shortcut; the `ResNet-18` / `ResNet-34` unit.
//!
//! The first conv carries the block stride; both convs share the block
//! dilation, padded so that dilation never changes resolution.

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::downsample::{ResNetDownsample, ResNetDownsampleConfig};
use crate::models::resnet::residual_block::ResidualBlockMeta;
use bimm_contracts::{ShapeContract, shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// A 3x3 conv/norm with matching padding for its dilation.
pub(crate) fn conv3x3_norm_config(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
    dilation: usize,
) -> ConvNorm2dConfig {
    Conv2dConfig::new([in_planes, out_planes], [3, 3])
        .with_stride([stride, stride])
        .with_dilation([dilation, dilation])
        .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
        .with_bias(false)
        .into()
}

/// [`BasicBlock`] Config.
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// The stride of the first conv.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate for both convs.
    #[config(default = 1)]
    pub dilation: usize,
}

impl ResidualBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn dilation(&self) -> usize {
        self.dilation
    }
}

impl BasicBlockConfig {
    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let downsample = if self.needs_downsample() {
            Some(
                ResNetDownsampleConfig::new(self.in_planes, self.planes)
                    .with_stride(self.stride)
                    .init(device),
            )
        } else {
            None
        };

        BasicBlock {
            conv_norm1: conv3x3_norm_config(self.in_planes, self.planes, self.stride, self.dilation)
                .init(device),
            conv_norm2: conv3x3_norm_config(self.planes, self.planes, 1, self.dilation)
                .init(device),
            downsample,
            act: Relu::new(),
        }
    }
}

/// Basic Block for `ResNet`.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// First 3x3 conv/norm; strided.
    pub conv_norm1: ConvNorm2d<B>,

    /// Second 3x3 conv/norm.
    pub conv_norm2: ConvNorm2d<B>,

    /// Optional shortcut projection.
    pub downsample: Option<ResNetDownsample<B>>,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> ResidualBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm1.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.conv_norm2.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm1.stride()[0]
    }

    fn dilation(&self) -> usize {
        self.conv_norm1.dilation()[0]
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, out_height*stride, out_width*stride]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_planes, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "in_planes",
            "in_height" = "out_height" * "stride",
            "in_width" = "out_width" * "stride",
        ];
        INPUT_CONTRACT.assert_shape(
            &input,
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.act.forward(self.conv_norm1.forward(input));
        let x = self.conv_norm2.forward(x);

        self.act.forward(x + identity)
    }
}
