//! # `Upsample2d` - score map upsampling.
//!
//! FCN heads upsample coarse class score maps back to input resolution,
//! either through a transposed convolution initialized to bilinear
//! interpolation ("deconvolution"), or through fixed bilinear interpolation.
//!
//! A deconvolution with kernel ``2*factor``, stride ``factor`` and padding
//! ``factor/2`` maps an ``[h, w]`` map to exactly ``[h*factor, w*factor]``
//! for even factors.

use crate::layers::align::resample_spatial;
use bimm_contracts::{ShapeContract, shape_contract};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::prelude::{Backend, Tensor};
use burn::tensor::TensorData;

/// How [`Upsample2d`] scales score maps.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum UpsampleMode {
    /// Learnable transposed convolution, bilinear initialized.
    Deconv,

    /// Transposed convolution fixed to the bilinear kernel.
    FrozenDeconv,

    /// Parameter-free bilinear interpolation.
    Bilinear,
}

/// Build the per-channel bilinear upsampling kernel.
///
/// The kernel is diagonal in channels: channel ``i`` only feeds channel ``i``.
///
/// # Arguments
///
/// - `channels`: the number of channels.
/// - `kernel_size`: the square kernel size.
///
/// # Returns
///
/// A ``[channels, channels, kernel_size, kernel_size]`` weight tensor.
pub fn bilinear_kernel<B: Backend>(
    channels: usize,
    kernel_size: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let filter = bilinear_filter(kernel_size);
    let plane = kernel_size * kernel_size;

    let mut data = vec![0.0f32; channels * channels * plane];
    for c in 0..channels {
        let start = (c * channels + c) * plane;
        data[start..start + plane].copy_from_slice(&filter);
    }

    Tensor::from_data(
        TensorData::new(data, [channels, channels, kernel_size, kernel_size]),
        device,
    )
}

/// The 2D bilinear filter for a square kernel, row-major.
pub fn bilinear_filter(kernel_size: usize) -> Vec<f32> {
    assert!(kernel_size > 0, "kernel_size must be > 0");
    let factor = kernel_size.div_ceil(2) as f32;
    let center = if kernel_size % 2 == 1 {
        factor - 1.0
    } else {
        factor - 0.5
    };

    let taps: Vec<f32> = (0..kernel_size)
        .map(|i| 1.0 - (i as f32 - center).abs() / factor)
        .collect();

    taps.iter()
        .flat_map(|row| taps.iter().map(move |col| row * col))
        .collect()
}

/// [`Upsample2d`] Meta.
pub trait Upsample2dMeta {
    /// Number of channels (in and out).
    fn channels(&self) -> usize;

    /// Integer scale factor.
    fn factor(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let [height, width] = input_resolution;
        [height * self.factor(), width * self.factor()]
    }
}

/// [`Upsample2d`] Config.
#[derive(Config, Debug)]
pub struct Upsample2dConfig {
    /// Number of channels.
    pub channels: usize,

    /// Integer scale factor; `1` or even.
    pub factor: usize,

    /// The upsample mode.
    #[config(default = "UpsampleMode::Deconv")]
    pub mode: UpsampleMode,
}

impl Upsample2dMeta for Upsample2dConfig {
    fn channels(&self) -> usize {
        self.channels
    }

    fn factor(&self) -> usize {
        self.factor
    }
}

impl Upsample2dConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("channels must be > 0".to_string());
        }
        if self.factor == 0 || (self.factor != 1 && self.factor % 2 != 0) {
            return Err(format!("factor must be 1 or even: {}", self.factor));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize an [`Upsample2d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Upsample2d<B> {
        self.expect_valid();

        let deconv = match self.mode {
            _ if self.factor == 1 => None,
            UpsampleMode::Bilinear => None,
            UpsampleMode::Deconv | UpsampleMode::FrozenDeconv => {
                let kernel_size = 2 * self.factor;
                let mut deconv: ConvTranspose2d<B> =
                    ConvTranspose2dConfig::new([self.channels, self.channels], [kernel_size; 2])
                        .with_stride([self.factor; 2])
                        .with_padding([self.factor / 2; 2])
                        .with_bias(false)
                        .init(device);

                deconv.weight =
                    Param::from_tensor(bilinear_kernel(self.channels, kernel_size, device));

                if self.mode == UpsampleMode::FrozenDeconv {
                    deconv = deconv.no_grad();
                }
                Some(deconv)
            }
        };

        Upsample2d {
            channels: self.channels,
            factor: self.factor,
            frozen: self.mode == UpsampleMode::FrozenDeconv,
            deconv,
        }
    }
}

/// Score map upsampling layer.
///
/// Either a bilinear-initialized transposed convolution,
/// or fixed bilinear interpolation when `deconv` is `None`.
#[derive(Module, Debug)]
pub struct Upsample2d<B: Backend> {
    /// Number of channels.
    pub channels: usize,

    /// Integer scale factor.
    pub factor: usize,

    /// Was the transposed convolution frozen at init?
    pub frozen: bool,

    /// Optional transposed convolution.
    pub deconv: Option<ConvTranspose2d<B>>,
}

impl<B: Backend> Upsample2dMeta for Upsample2d<B> {
    fn channels(&self) -> usize {
        self.channels
    }

    fn factor(&self) -> usize {
        self.factor
    }
}

impl<B: Backend> Upsample2d<B> {
    /// The mode this layer was built with; `None` for the identity.
    pub fn mode(&self) -> Option<UpsampleMode> {
        match &self.deconv {
            _ if self.factor == 1 => None,
            None => Some(UpsampleMode::Bilinear),
            Some(_) if self.frozen => Some(UpsampleMode::FrozenDeconv),
            Some(_) => Some(UpsampleMode::Deconv),
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, height*factor, width*factor]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "channels",
            "height",
            "width",
        ];
        let [height, width] = INPUT_CONTRACT.unpack_shape(
            &input,
            &["height", "width"],
            &[("channels", self.channels)],
        );
        let target = self.output_resolution([height, width]);
        self.forward_to(input, target)
    }

    /// Upsample and fit to an exact resolution.
    ///
    /// The upsampled map is cropped (top-left anchored) to ``size``; any
    /// shortfall, as left by backbones with inexact strides, is closed by
    /// bilinear resizing rather than zero padding. Bilinear mode resamples
    /// directly to ``size``.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    /// - `size`: ``[out_height, out_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, out_height, out_width]``
    pub fn forward_to(
        &self,
        input: Tensor<B, 4>,
        size: [usize; 2],
    ) -> Tensor<B, 4> {
        match &self.deconv {
            Some(deconv) => resample_spatial(deconv.forward(input), size),
            None => resample_spatial(input, size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::{ShapeContract, shape_contract};
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_bilinear_filter() {
        // factor 2 -> kernel 4: taps [0.25, 0.75, 0.75, 0.25].
        let filter = bilinear_filter(4);
        assert_eq!(filter.len(), 16);
        assert_that!(filter[0] as f64, close_to(0.0625, 1e-6));
        assert_that!(filter[5] as f64, close_to(0.5625, 1e-6));
        assert_that!(filter[1] as f64, close_to(0.1875, 1e-6));

        // odd kernels peak at 1.0 in the center.
        let filter = bilinear_filter(3);
        assert_that!(filter[4] as f64, close_to(1.0, 1e-6));
    }

    #[test]
    fn test_bilinear_kernel_is_channel_diagonal() {
        let device = Default::default();
        let kernel: Tensor<B, 4> = bilinear_kernel(3, 4, &device);
        assert_eq!(kernel.dims(), [3, 3, 4, 4]);

        let off_diagonal = kernel.clone().slice([0..1, 1..2, 0..4, 0..4]).abs().sum();
        assert_eq!(off_diagonal.into_scalar(), 0.0);

        let diagonal = kernel.slice([2..3, 2..3, 0..4, 0..4]).sum().into_scalar();
        // sum of taps = (0.25 + 0.75 + 0.75 + 0.25)^2
        assert_that!(diagonal as f64, close_to(4.0, 1e-5));
    }

    #[test]
    fn test_config_validation() {
        assert!(Upsample2dConfig::new(4, 1).try_validate().is_ok());
        assert!(Upsample2dConfig::new(4, 8).try_validate().is_ok());
        assert!(Upsample2dConfig::new(4, 3).try_validate().is_err());
        assert!(Upsample2dConfig::new(4, 0).try_validate().is_err());
        assert!(Upsample2dConfig::new(0, 2).try_validate().is_err());
    }

    #[test]
    fn test_deconv_upsample_shape() {
        let device = Default::default();
        for factor in [2, 8, 32] {
            let layer: Upsample2d<B> = Upsample2dConfig::new(5, factor).init(&device);
            assert!(layer.deconv.is_some());
            assert_eq!(layer.output_resolution([3, 2]), [3 * factor, 2 * factor]);

            let input = Tensor::random([2, 5, 3, 2], Distribution::Default, &device);
            let output = layer.forward(input);
            static OUTPUT_CONTRACT: ShapeContract = shape_contract![
                "batch",
                "channels",
                "height",
                "width",
            ];
            OUTPUT_CONTRACT.assert_shape(
                &output,
                &[
                    ("batch", 2),
                    ("channels", 5),
                    ("height", 3 * factor),
                    ("width", 2 * factor)
                ],
            );
        }
    }

    #[test]
    fn test_deconv_preserves_constant_interior() {
        // Bilinear interpolation of a constant map is constant away from the border.
        let device = Default::default();
        let layer: Upsample2d<B> = Upsample2dConfig::new(2, 2).init(&device);

        let input = Tensor::ones([1, 2, 4, 4], &device) * 3.0;
        let output = layer.forward(input);
        let interior = output.slice([0..1, 0..2, 1..7, 1..7]);

        let max_err = (interior - 3.0).abs().max().into_scalar();
        assert!(max_err < 1e-5, "max_err: {max_err}");
    }

    #[test]
    fn test_forward_to_fits_odd_sizes() {
        let device = Default::default();
        let layer: Upsample2d<B> = Upsample2dConfig::new(3, 2).init(&device);

        let input = Tensor::random([1, 3, 4, 4], Distribution::Default, &device);
        assert_eq!(layer.forward_to(input.clone(), [7, 9]).dims(), [1, 3, 7, 9]);

        let bilinear: Upsample2d<B> = Upsample2dConfig::new(3, 2)
            .with_mode(UpsampleMode::Bilinear)
            .init(&device);
        assert!(bilinear.deconv.is_none());
        assert_eq!(bilinear.mode(), Some(UpsampleMode::Bilinear));
        assert_eq!(bilinear.forward_to(input, [7, 9]).dims(), [1, 3, 7, 9]);
    }

    #[test]
    fn test_forward_to_shortfall_has_no_zero_border() {
        let device = Default::default();
        let layer: Upsample2d<B> = Upsample2dConfig::new(2, 2).init(&device);

        // 4 * 2 = 8 rows, one short of the target.
        let input = Tensor::ones([1, 2, 4, 4], &device);
        let output = layer.forward_to(input, [9, 8]);
        assert_eq!(output.dims(), [1, 2, 9, 8]);

        let last_row = output.slice([0..1, 0..2, 8..9, 0..8]).abs().min().into_scalar();
        assert!(last_row > 0.0, "last row: {last_row}");
    }

    #[test]
    fn test_identity_factor() {
        let device = Default::default();
        let layer: Upsample2d<B> = Upsample2dConfig::new(3, 1).init(&device);
        assert!(layer.deconv.is_none());
        assert_eq!(layer.mode(), None);

        let input = Tensor::random([1, 3, 4, 5], Distribution::Default, &device);
        layer
            .forward(input.clone())
            .to_data()
            .assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_frozen_deconv_has_no_grad() {
        type A = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let frozen: Upsample2d<A> = Upsample2dConfig::new(2, 2)
            .with_mode(UpsampleMode::FrozenDeconv)
            .init(&device);
        assert!(!frozen.deconv.as_ref().unwrap().weight.is_require_grad());
        assert_eq!(frozen.mode(), Some(UpsampleMode::FrozenDeconv));

        let learnable: Upsample2d<A> = Upsample2dConfig::new(2, 2).init(&device);
        assert!(learnable.deconv.as_ref().unwrap().weight.is_require_grad());
        assert_eq!(learnable.mode(), Some(UpsampleMode::Deconv));
    }
}
