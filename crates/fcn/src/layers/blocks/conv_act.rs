//! # `ConvAct2d` - conv/[norm]/relu/[dropout] block.
//!
//! A [`ConvAct2d`] module is:
//! * a [`Conv2d`] layer,
//! * an optional [`BatchNorm`] layer,
//! * a [`Relu`] activation,
//! * an optional [`Dropout`] layer.
//!
//! This is the feature unit of the `AlexNet` and `VGG` backbones, and
//! of the convolutionalized ``fc6`` / ``fc7`` classifier heads.

use bimm_contracts::{ShapeContract, shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// [`ConvAct2d`] Meta.
pub trait ConvAct2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Square kernel size.
    fn kernel_size(&self) -> usize;

    /// Get the stride.
    fn stride(&self) -> [usize; 2];

    /// Is there a norm layer?
    fn has_norm(&self) -> bool;
}

/// [`ConvAct2d`] Config.
#[derive(Config, Debug)]
pub struct ConvAct2dConfig {
    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,

    /// Insert a [`BatchNorm`] between the conv and the activation.
    #[config(default = false)]
    pub batch_norm: bool,

    /// Dropout probability after the activation; `0.0` disables the layer.
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl From<Conv2dConfig> for ConvAct2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self::new(conv)
    }
}

impl ConvAct2dMeta for ConvAct2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn has_norm(&self) -> bool {
        self.batch_norm
    }
}

impl ConvAct2dConfig {
    /// Build a square-kernel "same" padded conv block.
    ///
    /// For odd kernels the output resolution matches the input resolution.
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
    ) -> Self {
        let pad = kernel_size / 2;
        Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .into()
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout must be in [0, 1): {}", self.dropout));
        }
        Ok(())
    }

    /// Initialize a [`ConvAct2d`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvAct2d<B> {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }

        ConvAct2d {
            norm: if self.batch_norm {
                Some(BatchNormConfig::new(self.out_channels()).init(device))
            } else {
                None
            },
            act: Relu::new(),
            dropout: if self.dropout > 0.0 {
                Some(DropoutConfig::new(self.dropout).init())
            } else {
                None
            },
            conv: self.conv.init(device),
        }
    }
}

/// Sequenced conv/[norm]/relu/[dropout] block.
#[derive(Module, Debug)]
pub struct ConvAct2d<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Optional norm layer.
    pub norm: Option<BatchNorm<B, 2>>,

    /// Activation layer.
    pub act: Relu,

    /// Optional dropout layer.
    pub dropout: Option<Dropout>,
}

impl<B: Backend> ConvAct2dMeta for ConvAct2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn has_norm(&self) -> bool {
        self.norm.is_some()
    }
}

impl<B: Backend> ConvAct2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "in_channels",
            "in_height",
            "in_width",
        ];
        INPUT_CONTRACT.assert_shape(&input, &[("in_channels", self.in_channels())]);

        let x = self.conv.forward(input);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = self.act.forward(x);
        match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::{ShapeContract, shape_contract};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_square_config() {
        let config = ConvAct2dConfig::square(3, 8, 3);
        assert_eq!(config.in_channels(), 3);
        assert_eq!(config.out_channels(), 8);
        assert_eq!(config.kernel_size(), 3);
        assert_eq!(config.stride(), [1, 1]);
        assert!(!config.has_norm());
        assert!(config.try_validate().is_ok());

        assert!(config.with_dropout(1.0).try_validate().is_err());
    }

    #[test]
    fn test_forward_keeps_resolution() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: ConvAct2d<B> = ConvAct2dConfig::square(3, 8, 3)
            .with_batch_norm(true)
            .init(&device);
        assert!(layer.has_norm());
        assert!(layer.dropout.is_none());

        let input = Tensor::random([2, 3, 10, 12], Distribution::Default, &device);
        let output = layer.forward(input);

        static OUTPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "channels",
            "height",
            "width",
        ];
        OUTPUT_CONTRACT.assert_shape(
            &output,
            &[("batch", 2), ("channels", 8), ("height", 10), ("width", 12)],
        );

        let min = output.min().into_scalar();
        assert!(min >= 0.0, "relu output must be non-negative: {min}");
    }

    #[test]
    fn test_forward_matches_composition() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: ConvAct2d<B> = ConvAct2dConfig::square(2, 4, 1).init(&device);
        let input = Tensor::random([1, 2, 4, 4], Distribution::Default, &device);

        let expected = burn::tensor::activation::relu(layer.conv.forward(input.clone()));
        layer
            .forward(input)
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }
}
