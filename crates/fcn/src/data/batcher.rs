//! # Segmentation Batching

use crate::data::item::SegmentationItem;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Int, Tensor, TensorData};

/// ImageNet RGB channel means.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet RGB channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A batch of images and label masks.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// ``[batch, 3, height, width]`` images.
    pub images: Tensor<B, 4>,

    /// ``[batch, height, width]`` class labels.
    pub masks: Tensor<B, 3, Int>,
}

/// Stacks [`SegmentationItem`]s into a [`SegmentationBatch`].
///
/// All items of a batch must share one resolution.
#[derive(Debug, Clone)]
pub struct SegmentationBatcher {
    normalization: Option<([f32; 3], [f32; 3])>,
}

impl Default for SegmentationBatcher {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl SegmentationBatcher {
    /// A batcher applying ImageNet normalization.
    pub fn imagenet() -> Self {
        Self::with_normalization(IMAGENET_MEAN, IMAGENET_STD)
    }

    /// A batcher passing ``[0, 1]`` pixels through unchanged.
    pub fn unnormalized() -> Self {
        Self {
            normalization: None,
        }
    }

    /// A batcher applying ``(x - mean) / std`` per channel.
    pub fn with_normalization(
        mean: [f32; 3],
        std: [f32; 3],
    ) -> Self {
        Self {
            normalization: Some((mean, std)),
        }
    }

    /// Normalize ``[batch, 3, height, width]`` images.
    pub fn normalize<B: Backend>(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self.normalization {
            Some((mean, std)) => {
                let device = images.device();
                let mean = Tensor::<B, 1>::from_floats(mean, &device).reshape([1, 3, 1, 1]);
                let std = Tensor::<B, 1>::from_floats(std, &device).reshape([1, 3, 1, 1]);
                (images - mean) / std
            }
            None => images,
        }
    }
}

impl<B: Backend> Batcher<B, SegmentationItem, SegmentationBatch<B>> for SegmentationBatcher {
    fn batch(
        &self,
        items: Vec<SegmentationItem>,
        device: &B::Device,
    ) -> SegmentationBatch<B> {
        let (height, width) = match items.first() {
            Some(item) => (item.height, item.width),
            None => panic!("cannot batch zero items"),
        };

        let mut images = Vec::with_capacity(items.len());
        let mut masks = Vec::with_capacity(items.len());
        for item in items {
            assert_eq!(
                [item.height, item.width],
                [height, width],
                "batch items must share a resolution"
            );
            let mask: Vec<i64> = item.mask.iter().map(|&label| label as i64).collect();

            images.push(Tensor::<B, 3>::from_data(
                TensorData::new(item.image, [3, height, width]),
                device,
            ));
            masks.push(Tensor::<B, 2, Int>::from_data(
                TensorData::new(mask, [height, width]),
                device,
            ));
        }

        SegmentationBatch {
            images: self.normalize(Tensor::stack(images, 0)),
            masks: Tensor::stack(masks, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    fn item(
        value: f32,
        label: usize,
    ) -> SegmentationItem {
        let mut item = SegmentationItem::blank(2, 3);
        item.image.fill(value);
        item.mask.fill(label);
        item
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batch: SegmentationBatch<B> =
            SegmentationBatcher::unnormalized().batch(vec![item(0.5, 1), item(0.25, 2)], &device);

        assert_eq!(batch.images.dims(), [2, 3, 2, 3]);
        assert_eq!(batch.masks.dims(), [2, 2, 3]);

        let sums: Vec<i64> = batch
            .masks
            .sum_dim(2)
            .sum_dim(1)
            .into_data()
            .iter::<i64>()
            .collect();
        assert_eq!(sums, vec![6, 12]);
    }

    #[test]
    fn test_imagenet_normalization() {
        let device = Default::default();
        let batch: SegmentationBatch<B> =
            SegmentationBatcher::imagenet().batch(vec![item(0.485, 0)], &device);

        let red: f32 = batch.images.clone().slice([0..1, 0..1]).mean().into_scalar();
        assert!(red.abs() < 1e-5, "red: {red}");

        let blue: f32 = batch.images.slice([0..1, 2..3]).mean().into_scalar();
        let expected = (0.485 - 0.406) / 0.225;
        assert_that!(blue as f64, close_to(expected, 1e-5));
    }

    #[test]
    #[should_panic(expected = "share a resolution")]
    fn test_mixed_resolutions() {
        let device = Default::default();
        let _: SegmentationBatch<B> = SegmentationBatcher::unnormalized()
            .batch(vec![item(0.0, 0), SegmentationItem::blank(3, 3)], &device);
    }
}
