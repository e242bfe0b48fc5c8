//! # Per-Pixel Loss

use bimm_contracts::{ShapeContract, shape_contract};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::activation::log_softmax;

/// Flatten ``[batch, classes, height, width]`` logits to per-pixel rows.
///
/// # Returns
///
/// ``[batch * height * width, classes]``, in ``(batch, y, x)`` row order.
pub fn flatten_pixels<B: Backend>(logits: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, classes, height, width] = logits.dims();
    logits
        .permute([0, 2, 3, 1])
        .reshape([batch * height * width, classes])
}

/// Flatten ``[batch, height, width]`` labels, matching [`flatten_pixels`].
pub fn flatten_labels<B: Backend>(labels: Tensor<B, 3, Int>) -> Tensor<B, 1, Int> {
    let [batch, height, width] = labels.dims();
    labels.reshape([batch * height * width])
}

/// Mean cross entropy over labeled pixels.
///
/// # Arguments
///
/// - `logits`: ``[batch, classes, height, width]``.
/// - `targets`: ``[batch, height, width]`` class labels.
/// - `ignore_index`: a label excluded from the loss, if any.
///
/// # Returns
///
/// A ``[1]`` loss; zero when every pixel is ignored.
pub fn pixel_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    targets: Tensor<B, 3, Int>,
    ignore_index: Option<usize>,
) -> Tensor<B, 1> {
    let [batch, _, height, width] = logits.dims();
    static TARGETS_CONTRACT: ShapeContract = shape_contract!["batch", "height", "width"];
    TARGETS_CONTRACT.assert_shape(
        &targets,
        &[("batch", batch), ("height", height), ("width", width)],
    );

    let log_probs = log_softmax(flatten_pixels(logits), 1);
    let targets = flatten_labels(targets);

    let (targets, weights) = match ignore_index {
        Some(ignore) => {
            let ignored = targets.clone().equal_elem(ignore as i64);
            let weights = ignored.clone().bool_not().float();
            // The ignore label may be out of class range; gather needs a valid index.
            (targets.mask_fill(ignored, 0), weights)
        }
        None => {
            let weights = targets.ones_like().float();
            (targets, weights)
        }
    };

    let picked: Tensor<B, 1> = log_probs
        .gather(1, targets.unsqueeze_dim(1))
        .squeeze::<1>(1);

    let count = weights.clone().sum().clamp_min(1.0);
    (picked * weights).sum().neg() / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::loss::CrossEntropyLossConfig;
    use burn::prelude::TensorData;
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_flatten_pixels() {
        let device = Default::default();
        let logits: Tensor<B, 4> = Tensor::arange(0..24, &device)
            .float()
            .reshape([2, 3, 2, 2]);

        let flat = flatten_pixels(logits);
        assert_eq!(flat.dims(), [8, 3]);

        // batch 0, pixel (0, 1): channels at offsets 1, 5, 9.
        flat.clone()
            .slice([1..2, 0..3])
            .to_data()
            .assert_eq(&TensorData::from([[1.0f32, 5.0, 9.0]]), true);
        // batch 1, pixel (1, 0): 12 + 2.
        flat.slice([6..7, 0..3])
            .to_data()
            .assert_eq(&TensorData::from([[14.0f32, 18.0, 22.0]]), true);
    }

    #[test]
    fn test_matches_burn_cross_entropy() {
        let device = Default::default();
        let logits: Tensor<B, 4> = Tensor::random([2, 4, 3, 5], Distribution::Default, &device);
        let targets: Tensor<B, 3, Int> =
            Tensor::random([2, 3, 5], Distribution::Uniform(0.0, 4.0), &device);

        let expected = CrossEntropyLossConfig::new()
            .init(&device)
            .forward(flatten_pixels(logits.clone()), flatten_labels(targets.clone()))
            .into_scalar();
        let actual = pixel_cross_entropy(logits, targets, None).into_scalar();

        assert_that!(actual as f64, close_to(expected as f64, 1e-5));
    }

    #[test]
    fn test_ignore_index() {
        let device = Default::default();
        let logits: Tensor<B, 4> = Tensor::random([1, 3, 2, 2], Distribution::Default, &device);

        // Only the first pixel is labeled.
        let targets: Tensor<B, 3, Int> =
            Tensor::from_data([[[2, 255], [255, 255]]], &device);
        let actual = pixel_cross_entropy(logits.clone(), targets, Some(255)).into_scalar();

        let first = flatten_pixels(logits).slice([0..1, 0..3]);
        let expected = -log_softmax(first, 1).slice([0..1, 2..3]).into_scalar();
        assert_that!(actual as f64, close_to(expected as f64, 1e-5));
    }

    #[test]
    fn test_all_ignored_is_zero() {
        let device = Default::default();
        let logits: Tensor<B, 4> = Tensor::random([1, 3, 2, 2], Distribution::Default, &device);
        let targets: Tensor<B, 3, Int> = Tensor::full([1, 2, 2], 255, &device);

        let loss = pixel_cross_entropy(logits, targets, Some(255)).into_scalar();
        assert_eq!(loss, 0.0);
    }
}
