//! # Residual Block Wrapper

use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig};
use crate::models::resnet::bottleneck::{BottleneckBlock, BottleneckBlockConfig};
use crate::models::resnet::util::stride_div_output_resolution;
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// Residual Block Meta API.
///
/// Shared by the block configs and modules.
pub trait ResidualBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of the block.
    fn stride(&self) -> usize;

    /// The dilation of the block's 3x3 convs.
    fn dilation(&self) -> usize;

    /// Does the shortcut need a projection?
    fn needs_downsample(&self) -> bool {
        self.stride() != 1 || self.in_planes() != self.out_planes()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the stride.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlockConfig),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlockConfig),
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_planes(),
            Self::Bottleneck(config) => config.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_planes(),
            Self::Bottleneck(config) => config.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }

    fn dilation(&self) -> usize {
        match self {
            Self::Basic(config) => config.dilation(),
            Self::Bottleneck(config) => config.dilation(),
        }
    }
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckBlockConfig> for ResidualBlockConfig {
    fn from(config: BottleneckBlockConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl ResidualBlockConfig {
    /// Build a block config.
    ///
    /// # Arguments
    ///
    /// - `in_planes`: input width.
    /// - `planes`: the block width; bottleneck blocks output ``planes * 4``.
    /// - `stride`: block stride.
    /// - `dilation`: block dilation.
    /// - `bottleneck`: build a [`BottleneckBlockConfig`].
    pub fn build(
        in_planes: usize,
        planes: usize,
        stride: usize,
        dilation: usize,
        bottleneck: bool,
    ) -> Self {
        if bottleneck {
            BottleneckBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .into()
        } else {
            BasicBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .with_dilation(dilation)
                .into()
        }
    }

    /// Is this a bottleneck block?
    pub fn is_bottleneck(&self) -> bool {
        matches!(self, Self::Bottleneck(_))
    }

    /// Initialize a [`ResidualBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => ResidualBlock::Basic(config.init(device)),
            Self::Bottleneck(config) => ResidualBlock::Bottleneck(config.init(device)),
        }
    }
}

/// Either a [`BasicBlock`] or a [`BottleneckBlock`].
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlock<B>),
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_planes(),
            Self::Bottleneck(block) => block.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_planes(),
            Self::Bottleneck(block) => block.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
        }
    }

    fn dilation(&self) -> usize {
        match self {
            Self::Basic(block) => block.dilation(),
            Self::Bottleneck(block) => block.dilation(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Is this a bottleneck block?
    pub fn is_bottleneck(&self) -> bool {
        matches!(self, Self::Bottleneck(_))
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_build() {
        let config = ResidualBlockConfig::build(64, 64, 1, 1, false);
        assert!(!config.is_bottleneck());
        assert_eq!(config.out_planes(), 64);
        assert!(!config.needs_downsample());

        let config = ResidualBlockConfig::build(256, 128, 2, 1, true);
        assert!(config.is_bottleneck());
        assert_eq!(config.out_planes(), 512);
        assert_eq!(config.stride(), 2);
    }

    #[test]
    fn test_forward_dispatch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: ResidualBlock<B> = ResidualBlockConfig::build(4, 2, 2, 1, true).init(&device);
        assert!(block.is_bottleneck());
        assert_eq!(block.out_planes(), 8);

        let input = Tensor::random([1, 4, 8, 8], Distribution::Default, &device);
        assert_eq!(block.forward(input).dims(), [1, 8, 4, 4]);
    }
}
