//! # Bottleneck Block for `ResNet`
//!
//! 1x1 reduce, 3x3 (strided, dilated), 1x1 expand; the `ResNet-50+` unit.
//! Follows the torchvision "v1.5" placement: the stride sits on the 3x3 conv.

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::basic_block::conv3x3_norm_config;
use crate::models::resnet::downsample::{ResNetDownsample, ResNetDownsampleConfig};
use crate::models::resnet::residual_block::ResidualBlockMeta;
use bimm_contracts::{ShapeContract, shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::Relu;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Output width multiplier of a bottleneck block.
pub const BOTTLENECK_EXPANSION: usize = 4;

fn conv1x1_norm_config(
    in_planes: usize,
    out_planes: usize,
) -> ConvNorm2dConfig {
    Conv2dConfig::new([in_planes, out_planes], [1, 1])
        .with_bias(false)
        .into()
}

/// [`BottleneckBlock`] Config.
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// Inner width; ``out_planes = planes * 4``.
    pub planes: usize,

    /// The stride of the 3x3 conv.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate of the 3x3 conv.
    #[config(default = 1)]
    pub dilation: usize,
}

impl ResidualBlockMeta for BottleneckBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.planes * BOTTLENECK_EXPANSION
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn dilation(&self) -> usize {
        self.dilation
    }
}

impl BottleneckBlockConfig {
    /// Initialize a [`BottleneckBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        let out_planes = self.out_planes();
        let downsample = if self.needs_downsample() {
            Some(
                ResNetDownsampleConfig::new(self.in_planes, out_planes)
                    .with_stride(self.stride)
                    .init(device),
            )
        } else {
            None
        };

        BottleneckBlock {
            conv_norm1: conv1x1_norm_config(self.in_planes, self.planes).init(device),
            conv_norm2: conv3x3_norm_config(self.planes, self.planes, self.stride, self.dilation)
                .init(device),
            conv_norm3: conv1x1_norm_config(self.planes, out_planes).init(device),
            downsample,
            act: Relu::new(),
        }
    }
}

/// Bottleneck Block for `ResNet`.
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// 1x1 reduce.
    pub conv_norm1: ConvNorm2d<B>,

    /// 3x3; strided and dilated.
    pub conv_norm2: ConvNorm2d<B>,

    /// 1x1 expand.
    pub conv_norm3: ConvNorm2d<B>,

    /// Optional shortcut projection.
    pub downsample: Option<ResNetDownsample<B>>,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> ResidualBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm1.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.conv_norm3.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm2.stride()[0]
    }

    fn dilation(&self) -> usize {
        self.conv_norm2.dilation()[0]
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Inner width of the block.
    pub fn planes(&self) -> usize {
        self.conv_norm1.out_channels()
    }

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
        let x = self.act.forward(self.conv_norm2.forward(x));
        let x = self.conv_norm3.forward(x);

        self.act.forward(x + identity)
    }
}
