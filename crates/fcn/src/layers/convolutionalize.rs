//! # Convolutionalization
//!
//! The defining FCN transform: a fully-connected layer over a flattened
//! ``[channels, kh, kw]`` feature window is the same function as a
//! ``kh x kw`` convolution over that window. Rewriting classifier ``Linear``
//! weights as ``Conv2d`` weights lets a pretrained classifier slide over
//! inputs of any size and emit a spatial score map.

use anyhow::bail;
use burn::module::Param;
use burn::nn::Linear;
use burn::nn::conv::Conv2d;
use burn::prelude::{Backend, Tensor};

/// Load ``Linear`` weights into a ``Conv2d``.
///
/// # Arguments
///
/// - `weight`: ``[in_channels * kh * kw, out_channels]``, burn ``Linear`` layout;
///   the input dimension is flattened channel-major (``c, y, x``).
/// - `bias`: optional ``[out_channels]``.
/// - `conv`: the target ``Conv2d``; ``[out_channels, in_channels, kh, kw]``, ungrouped.
///
/// # Returns
///
/// The target conv with replaced weights.
pub fn linear_weights_into_conv2d<B: Backend>(
    weight: Tensor<B, 2>,
    bias: Option<Tensor<B, 1>>,
    mut conv: Conv2d<B>,
) -> anyhow::Result<Conv2d<B>> {
    let [out_channels, in_channels, kh, kw] = conv.weight.val().dims();
    let [d_input, d_output] = weight.dims();

    if conv.groups != 1 {
        bail!("cannot convolutionalize into a grouped conv: groups={}", conv.groups);
    }
    if d_input != in_channels * kh * kw || d_output != out_channels {
        bail!(
            "linear [{d_input}, {d_output}] does not match conv [{out_channels}, {in_channels}, {kh}, {kw}]"
        );
    }

    conv.weight = Param::from_tensor(
        weight
            .transpose()
            .reshape([out_channels, in_channels, kh, kw]),
    );

    conv.bias = match (bias, conv.bias) {
        (Some(bias), Some(_)) => Some(Param::from_tensor(bias)),
        (None, None) => None,
        (Some(_), None) => bail!("linear has a bias but the target conv does not"),
        (None, Some(_)) => bail!("target conv has a bias but the linear does not"),
    };

    Ok(conv)
}

/// Load a ``Linear`` layer's weights into a ``Conv2d``.
///
/// See [`linear_weights_into_conv2d`].
pub fn linear_into_conv2d<B: Backend>(
    linear: Linear<B>,
    conv: Conv2d<B>,
) -> anyhow::Result<Conv2d<B>> {
    linear_weights_into_conv2d(
        linear.weight.val(),
        linear.bias.map(|b| b.val()),
        conv,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;
    use burn::nn::conv::Conv2dConfig;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_conv_matches_linear_on_window() {
        let device = Default::default();
        let [channels, kh, kw, classes] = [2, 3, 3, 4];

        let linear: Linear<B> = LinearConfig::new(channels * kh * kw, classes).init(&device);
        let conv: Conv2d<B> = Conv2dConfig::new([channels, classes], [kh, kw]).init(&device);

        let input: Tensor<B, 4> =
            Tensor::random([3, channels, kh, kw], Distribution::Default, &device);

        let expected = linear.forward(input.clone().reshape([3, channels * kh * kw]));

        let conv = linear_into_conv2d(linear, conv).unwrap();
        let actual = conv.forward(input).reshape([3, classes]);

        let max_err = (actual - expected).abs().max().into_scalar();
        assert!(max_err < 1e-5, "max_err: {max_err}");
    }

    #[test]
    fn test_sliding_window() {
        // On a larger input the conv evaluates the linear at every window.
        let device = Default::default();

        let linear: Linear<B> = LinearConfig::new(2 * 2 * 2, 3).init(&device);
        let conv: Conv2d<B> = Conv2dConfig::new([2, 3], [2, 2]).init(&device);
        let conv = linear_into_conv2d(linear.clone(), conv).unwrap();

        let input: Tensor<B, 4> = Tensor::random([1, 2, 4, 5], Distribution::Default, &device);
        let output = conv.forward(input.clone());
        assert_eq!(output.dims(), [1, 3, 3, 4]);

        let window = input.slice([0..1, 0..2, 1..3, 2..4]).reshape([1, 8]);
        let expected = linear.forward(window);
        let actual = output.slice([0..1, 0..3, 1..2, 2..3]).reshape([1, 3]);

        let max_err = (actual - expected).abs().max().into_scalar();
        assert!(max_err < 1e-5, "max_err: {max_err}");
    }

    #[test]
    fn test_shape_mismatch() {
        let device = Default::default();

        let linear: Linear<B> = LinearConfig::new(10, 3).init(&device);
        let conv: Conv2d<B> = Conv2dConfig::new([2, 3], [2, 2]).init(&device);

        let err = linear_into_conv2d(linear, conv).unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
    }

    #[test]
    fn test_bias_mismatch() {
        let device = Default::default();

        let linear: Linear<B> = LinearConfig::new(8, 3).init(&device);
        let conv: Conv2d<B> = Conv2dConfig::new([2, 3], [2, 2])
            .with_bias(false)
            .init(&device);

        assert!(linear_into_conv2d(linear, conv).is_err());
    }
}
