//! # FCN Feature Head
//!
//! The layers between the deepest backbone tap and the class scorer.
//!
//! For `AlexNet` and `VGG` this is the convolutionalized ImageNet
//! classifier: ``fc6`` as a ``k x k`` conv over the last pool, and
//! ``fc7`` as a 1x1 conv. For `ResNet` it is a compact 3x3 conv/norm
//! block.

use crate::layers::blocks::conv_act::{ConvAct2d, ConvAct2dConfig, ConvAct2dMeta};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Tensor};

/// Width of the `AlexNet` / `VGG` ``fc6`` and ``fc7`` layers.
pub const CLASSIFIER_HIDDEN: usize = 4096;

/// [`FcnHead`] Config.
#[derive(Config, Debug)]
pub struct FcnHeadConfig {
    /// Input (deep tap) channels.
    pub in_channels: usize,

    /// Output channels of ``fc6`` (and ``fc7``).
    pub hidden_channels: usize,

    /// Square kernel of ``fc6``.
    #[config(default = 7)]
    pub kernel_size: usize,

    /// Padding of ``fc6``.
    #[config(default = 3)]
    pub padding: usize,

    /// Append the 1x1 ``fc7`` layer.
    #[config(default = true)]
    pub fc7: bool,

    /// Batch norm after each conv; drops the conv bias.
    #[config(default = false)]
    pub batch_norm: bool,

    /// Dropout after each activation.
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl FcnHeadConfig {
    /// The convolutionalized `VGG` classifier: ``fc6`` 7x7, ``fc7`` 1x1.
    pub fn vgg(in_channels: usize) -> Self {
        Self::new(in_channels, CLASSIFIER_HIDDEN)
    }

    /// The convolutionalized `AlexNet` classifier: ``fc6`` 6x6, ``fc7`` 1x1.
    pub fn alexnet(in_channels: usize) -> Self {
        Self::new(in_channels, CLASSIFIER_HIDDEN).with_kernel_size(6)
    }

    /// A compact 3x3 conv/norm head, a quarter of the input width.
    pub fn compact(in_channels: usize) -> Self {
        Self::new(in_channels, (in_channels / 4).max(1))
            .with_kernel_size(3)
            .with_padding(1)
            .with_fc7(false)
            .with_batch_norm(true)
            .with_dropout(0.1)
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_channels == 0 || self.hidden_channels == 0 {
            return Err(format!(
                "head channels must be > 0: in={}, hidden={}",
                self.in_channels, self.hidden_channels
            ));
        }
        if self.kernel_size == 0 {
            return Err("head kernel_size must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("head dropout must be in [0, 1): {}", self.dropout));
        }
        Ok(())
    }

    /// Predict the head output resolution.
    ///
    /// # Returns
    ///
    /// `None` if the ``fc6`` window does not fit.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        crate::layers::conv_shape::maybe_conv2d_output_resolution(
            input_resolution,
            self.kernel_size,
            1,
            self.padding,
            1,
        )
    }

    fn block(
        &self,
        in_channels: usize,
        kernel_size: usize,
        padding: usize,
    ) -> ConvAct2dConfig {
        Conv2dConfig::new(
            [in_channels, self.hidden_channels],
            [kernel_size, kernel_size],
        )
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(!self.batch_norm)
        .into()
    }

    /// Initialize a [`FcnHead`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FcnHead<B> {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }

        let fc6 = self
            .block(self.in_channels, self.kernel_size, self.padding)
            .with_batch_norm(self.batch_norm)
            .with_dropout(self.dropout)
            .init(device);

        let fc7 = if self.fc7 {
            Some(
                self.block(self.hidden_channels, 1, 0)
                    .with_batch_norm(self.batch_norm)
                    .with_dropout(self.dropout)
                    .init(device),
            )
        } else {
            None
        };

        FcnHead { fc6, fc7 }
    }
}

/// FCN feature head.
#[derive(Module, Debug)]
pub struct FcnHead<B: Backend> {
    /// ``fc6``
    pub fc6: ConvAct2d<B>,

    /// ``fc7``
    pub fc7: Option<ConvAct2d<B>>,
}

impl<B: Backend> FcnHead<B> {
    /// Output channels.
    pub fn out_channels(&self) -> usize {
        match &self.fc7 {
            Some(fc7) => fc7.out_channels(),
            None => self.fc6.out_channels(),
        }
    }

    /// Recover the [`FcnHeadConfig`] from the module structure.
    pub fn to_config(&self) -> FcnHeadConfig {
        let padding = match &*self.fc6.conv.padding {
            PaddingConfig2d::Explicit(pad, _) => *pad,
            _ => 0,
        };
        let dropout = self.fc6.dropout.as_ref().map_or(0.0, |d| d.prob);

        FcnHeadConfig::new(self.fc6.in_channels(), self.fc6.out_channels())
            .with_kernel_size(self.fc6.kernel_size())
            .with_padding(padding)
            .with_fc7(self.fc7.is_some())
            .with_batch_norm(self.fc6.has_norm())
            .with_dropout(dropout)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, hidden_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.fc6.forward(input);
        match &self.fc7 {
            Some(fc7) => fc7.forward(x),
            None => x,
        }
    }
}
