//! # Training Glue
//!
//! Plugs [`Fcn`] into the burn learner. Logits and masks are flattened to
//! per-pixel rows so the stock classification metrics apply; pixels
//! labeled [`IGNORE_INDEX`] are excluded from the loss, and metrics
//! should be built with ``with_pad_token(IGNORE_INDEX)``.

use crate::data::{IGNORE_INDEX, SegmentationBatch};
use crate::models::fcn::Fcn;
use crate::segmentation::loss::{flatten_labels, flatten_pixels, pixel_cross_entropy};
use crate::segmentation::metrics::ConfusionMatrix;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};

impl<B: Backend> Fcn<B> {
    /// Score a batch for training or validation.
    ///
    /// # Arguments
    ///
    /// - `images`: ``[batch, channels, height, width]``.
    /// - `masks`: ``[batch, height, width]`` targets.
    ///
    /// # Returns
    ///
    /// A [`ClassificationOutput`] over ``batch * height * width`` pixels.
    pub fn forward_segmentation(
        &self,
        images: Tensor<B, 4>,
        masks: Tensor<B, 3, Int>,
    ) -> ClassificationOutput<B> {
        let logits = self.forward(images);
        let loss = pixel_cross_entropy(logits.clone(), masks.clone(), Some(IGNORE_INDEX));

        ClassificationOutput::new(loss, flatten_pixels(logits), flatten_labels(masks))
    }

    /// Accumulate this model's predictions on a batch into `matrix`.
    pub fn evaluate_batch(
        &self,
        batch: SegmentationBatch<B>,
        matrix: &mut ConfusionMatrix,
    ) {
        matrix.update(self.predict(batch.images), batch.masks);
    }
}

impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, ClassificationOutput<B>> for Fcn<B> {
    fn step(
        &self,
        batch: SegmentationBatch<B>,
    ) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_segmentation(batch.images, batch.masks);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<SegmentationBatch<B>, ClassificationOutput<B>> for Fcn<B> {
    fn step(
        &self,
        batch: SegmentationBatch<B>,
    ) -> ClassificationOutput<B> {
        self.forward_segmentation(batch.images, batch.masks)
    }
}
