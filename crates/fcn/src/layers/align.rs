//! # Spatial Alignment
//!
//! FCN score maps from different depths of a backbone rarely line up
//! exactly; these helpers pad, crop and fit ``[batch, channels, height, width]``
//! tensors so they can be fused and returned at input resolution.
//!
//! All helpers are top-left anchored: padding is added on the bottom/right,
//! and cropping keeps the top-left corner.

use crate::layers::conv_shape::round_up_to_multiple;
use burn::prelude::{Backend, Tensor};
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Crop a ``[batch, channels, height, width]`` tensor to a window.
///
/// # Arguments
///
/// - `input`: ``[batch, channels, in_height, in_width]``.
/// - `offset`: ``[top, left]``.
/// - `size`: ``[height, width]``; the window must fit inside the input.
///
/// # Returns
///
/// ``[batch, channels, height, width]``
///
/// # Panics
///
/// If the window does not fit inside the input.
pub fn crop_spatial<B: Backend>(
    input: Tensor<B, 4>,
    offset: [usize; 2],
    size: [usize; 2],
) -> Tensor<B, 4> {
    let [batch, channels, in_height, in_width] = input.dims();
    let [top, left] = offset;
    let [height, width] = size;
    assert!(
        top + height <= in_height && left + width <= in_width,
        "crop window {size:?} at {offset:?} exceeds input [{in_height}, {in_width}]"
    );

    input.slice([0..batch, 0..channels, top..top + height, left..left + width])
}

/// Fit a ``[batch, channels, height, width]`` tensor to an exact resolution.
///
/// Each spatial dim is independently cropped (keeping the top/left)
/// or zero padded (on the bottom/right).
pub fn fit_spatial<B: Backend>(
    input: Tensor<B, 4>,
    size: [usize; 2],
) -> Tensor<B, 4> {
    let [in_height, in_width] = spatial_dims(&input);
    let [height, width] = size;

    if in_height == height && in_width == width {
        return input;
    }

    let pad_bottom = height.saturating_sub(in_height);
    let pad_right = width.saturating_sub(in_width);
    let x = if pad_bottom > 0 || pad_right > 0 {
        input.pad((0, pad_right, 0, pad_bottom), 0.0)
    } else {
        input
    };

    crop_spatial(x, [0, 0], size)
}

/// Resample a ``[batch, channels, height, width]`` tensor to an exact resolution.
///
/// Dims larger than ``size`` are cropped (keeping the top/left); if any
/// dim is then still short, the map is bilinearly resized to ``size``.
/// Unlike [`fit_spatial`], the result has no zero border.
pub fn resample_spatial<B: Backend>(
    input: Tensor<B, 4>,
    size: [usize; 2],
) -> Tensor<B, 4> {
    let [in_height, in_width] = spatial_dims(&input);
    let [height, width] = size;

    let x = crop_spatial(input, [0, 0], [in_height.min(height), in_width.min(width)]);
    if spatial_dims(&x) == size {
        return x;
    }

    interpolate(
        x,
        size,
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
}

/// Zero pad the bottom/right of a tensor so its resolution is a multiple of `multiple`.
///
/// # Returns
///
/// ``(padded, [original_height, original_width])``
pub fn pad_to_multiple<B: Backend>(
    input: Tensor<B, 4>,
    multiple: usize,
) -> (Tensor<B, 4>, [usize; 2]) {
    let [height, width] = spatial_dims(&input);
    let target = [
        round_up_to_multiple(height, multiple),
        round_up_to_multiple(width, multiple),
    ];
    (fit_spatial(input, target), [height, width])
}

/// The ``[height, width]`` of a ``[batch, channels, height, width]`` tensor.
pub fn spatial_dims<B: Backend>(input: &Tensor<B, 4>) -> [usize; 2] {
    let [_, _, height, width] = input.dims();
    [height, width]
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn test_crop_spatial() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::from_data(
            TensorData::new((0..16).map(|v| v as f32).collect::<Vec<_>>(), [1, 1, 4, 4]),
            &device,
        );

        let output = crop_spatial(input, [1, 2], [2, 2]);
        output.to_data().assert_eq(
            &TensorData::new(vec![6.0f32, 7.0, 10.0, 11.0], [1, 1, 2, 2]),
            true,
        );
    }

    #[test]
    #[should_panic(expected = "exceeds input")]
    fn test_crop_spatial_out_of_bounds() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::zeros([1, 1, 4, 4], &device);
        crop_spatial(input, [3, 0], [2, 2]);
    }

    #[test]
    fn test_fit_spatial_pads_and_crops() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::ones([2, 3, 5, 7], &device);

        // grow height, shrink width.
        let output = fit_spatial(input.clone(), [6, 4]);
        assert_eq!(output.dims(), [2, 3, 6, 4]);

        // padded row is zero, original rows are one.
        let total = output.sum().into_scalar();
        assert_eq!(total, (2 * 3 * 5 * 4) as f32);

        // no-op.
        let same = fit_spatial(input.clone(), [5, 7]);
        same.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_resample_spatial() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::ones([2, 3, 5, 7], &device);

        // crop only: an exact window of the input.
        let output = resample_spatial(input.clone(), [4, 6]);
        assert_eq!(output.dims(), [2, 3, 4, 6]);
        assert_eq!(output.min().into_scalar(), 1.0);

        // short height, long width: no zero border.
        let output = resample_spatial(input.clone(), [8, 6]);
        assert_eq!(output.dims(), [2, 3, 8, 6]);
        let min_value = output.min().into_scalar();
        assert!((min_value - 1.0).abs() < 1e-5, "min: {min_value}");

        let same = resample_spatial(input.clone(), [5, 7]);
        same.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_pad_to_multiple() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::random([1, 2, 33, 64], Distribution::Default, &device);

        let (padded, original) = pad_to_multiple(input.clone(), 32);
        assert_eq!(original, [33, 64]);
        assert_eq!(padded.dims(), [1, 2, 64, 64]);

        let restored = crop_spatial(padded, [0, 0], original);
        restored.to_data().assert_eq(&input.to_data(), true);
    }
}
