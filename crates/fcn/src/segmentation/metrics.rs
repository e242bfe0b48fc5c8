//! # Segmentation Metrics
//!
//! A host-side [`ConfusionMatrix`] accumulated over label maps, and the
//! four standard FCN scores derived from it:
//!
//! * pixel accuracy: ``sum_i n_ii / sum_i t_i``
//! * mean accuracy: ``mean_i n_ii / t_i``
//! * mean IoU: ``mean_i n_ii / (t_i + sum_j n_ji - n_ii)``
//! * frequency weighted IoU: ``sum_i t_i * IoU_i / sum_i t_i``
//!
//! where ``n_ij`` counts pixels of class ``i`` predicted as ``j`` and
//! ``t_i = sum_j n_ij``. Classes absent from both targets and predictions
//! are excluded from the means. Predictions outside the class range count
//! toward ``t_i`` as misses.

use burn::prelude::{Backend, Int, Tensor};
use serde::{Deserialize, Serialize};

/// Target by prediction pixel counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    ignore_index: Option<usize>,

    /// Row major ``[target][prediction]``.
    counts: Vec<u64>,

    /// Per target class, pixels predicted outside the class range.
    out_of_range: Vec<u64>,
}

impl ConfusionMatrix {
    /// Create an empty matrix.
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            ignore_index: None,
            counts: vec![0; num_classes * num_classes],
            out_of_range: vec![0; num_classes],
        }
    }

    /// Skip pixels whose target is `ignore_index`.
    pub fn with_ignore_index(
        self,
        ignore_index: Option<usize>,
    ) -> Self {
        Self {
            ignore_index,
            ..self
        }
    }

    /// The number of classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// The count of target `target` pixels predicted as `prediction`.
    pub fn count(
        &self,
        target: usize,
        prediction: usize,
    ) -> u64 {
        self.counts[target * self.num_classes + prediction]
    }

    /// The count of target `target` pixels predicted outside the class range.
    pub fn out_of_range_count(
        &self,
        target: usize,
    ) -> u64 {
        self.out_of_range[target]
    }

    /// Total counted pixels.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.out_of_range.iter().sum::<u64>()
    }

    /// Clear all counts.
    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.out_of_range.fill(0);
    }

    /// Accumulate paired label slices.
    ///
    /// Ignored and out of range targets are skipped; out of range
    /// predictions of a valid target are counted as misses.
    ///
    /// # Panics
    ///
    /// If the slices differ in length.
    pub fn update_from_labels(
        &mut self,
        predictions: &[usize],
        targets: &[usize],
    ) {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "predictions and targets differ in length"
        );
        let k = self.num_classes;
        for (&prediction, &target) in predictions.iter().zip(targets) {
            if Some(target) == self.ignore_index || target >= k {
                continue;
            }
            if prediction >= k {
                self.out_of_range[target] += 1;
            } else {
                self.counts[target * k + prediction] += 1;
            }
        }
    }

    /// Accumulate a batch of label maps.
    ///
    /// # Arguments
    ///
    /// - `predictions`: ``[batch, height, width]`` predicted labels.
    /// - `targets`: ``[batch, height, width]`` target labels.
    pub fn update<B: Backend, const D: usize>(
        &mut self,
        predictions: Tensor<B, D, Int>,
        targets: Tensor<B, D, Int>,
    ) {
        assert_eq!(predictions.dims(), targets.dims());
        let to_labels = |labels: Tensor<B, D, Int>| -> Vec<usize> {
            labels
                .into_data()
                .iter::<i64>()
                .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
                .collect()
        };
        self.update_from_labels(&to_labels(predictions), &to_labels(targets));
    }

    /// Add another matrix's counts.
    pub fn merge(
        &mut self,
        other: &Self,
    ) {
        assert_eq!(self.num_classes, other.num_classes);
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        for (a, b) in self.out_of_range.iter_mut().zip(&other.out_of_range) {
            *a += b;
        }
    }

    fn target_total(
        &self,
        class: usize,
    ) -> u64 {
        (0..self.num_classes)
            .map(|p| self.count(class, p))
            .sum::<u64>()
            + self.out_of_range[class]
    }

    fn prediction_total(
        &self,
        class: usize,
    ) -> u64 {
        (0..self.num_classes).map(|t| self.count(t, class)).sum()
    }

    fn correct(&self) -> u64 {
        (0..self.num_classes).map(|c| self.count(c, c)).sum()
    }

    /// Fraction of counted pixels labeled correctly.
    pub fn pixel_accuracy(&self) -> f64 {
        ratio(self.correct(), self.total()).unwrap_or(0.0)
    }

    /// Per-class recall; `None` for classes absent from the targets.
    pub fn class_accuracy(&self) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|c| ratio(self.count(c, c), self.target_total(c)))
            .collect()
    }

    /// Mean of [`Self::class_accuracy`] over present classes.
    pub fn mean_accuracy(&self) -> f64 {
        present_mean(&self.class_accuracy())
    }

    /// Per-class intersection over union.
    ///
    /// `None` for classes absent from both targets and predictions.
    pub fn class_iou(&self) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|c| {
                let hit = self.count(c, c);
                let union = self.target_total(c) + self.prediction_total(c) - hit;
                ratio(hit, union)
            })
            .collect()
    }

    /// Mean of [`Self::class_iou`] over present classes.
    pub fn mean_iou(&self) -> f64 {
        present_mean(&self.class_iou())
    }

    /// IoU weighted by target class frequency.
    pub fn frequency_weighted_iou(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.class_iou()
            .into_iter()
            .enumerate()
            .map(|(c, iou)| {
                let freq = self.target_total(c) as f64 / total as f64;
                freq * iou.unwrap_or(0.0)
            })
            .sum()
    }
}

fn ratio(
    num: u64,
    den: u64,
) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

fn present_mean(values: &[Option<f64>]) -> f64 {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use hamcrest::prelude::*;

    #[test]
    fn test_scores() {
        let mut cm = ConfusionMatrix::new(3);
        // targets:     0 0 0 0 1 1 2 2
        // predictions: 0 0 0 1 1 1 2 0
        cm.update_from_labels(&[0, 0, 0, 1, 1, 1, 2, 0], &[0, 0, 0, 0, 1, 1, 2, 2]);

        assert_eq!(cm.total(), 8);
        assert_eq!(cm.count(0, 1), 1);
        assert_eq!(cm.count(2, 0), 1);

        assert_that!(cm.pixel_accuracy(), close_to(6.0 / 8.0, 1e-12));

        // recall: 3/4, 2/2, 1/2
        assert_that!(cm.mean_accuracy(), close_to((0.75 + 1.0 + 0.5) / 3.0, 1e-12));

        // iou: 3/(4+4-3), 2/(2+3-2), 1/(2+1-1)
        let iou = [3.0 / 5.0, 2.0 / 3.0, 1.0 / 2.0];
        let class_iou = cm.class_iou();
        for (actual, expected) in class_iou.iter().zip(iou) {
            assert_that!(actual.unwrap(), close_to(expected, 1e-12));
        }
        assert_that!(cm.mean_iou(), close_to(iou.iter().sum::<f64>() / 3.0, 1e-12));

        let fw = (4.0 * iou[0] + 2.0 * iou[1] + 2.0 * iou[2]) / 8.0;
        assert_that!(cm.frequency_weighted_iou(), close_to(fw, 1e-12));
    }

    #[test]
    fn test_absent_classes_and_ignore() {
        let mut cm = ConfusionMatrix::new(4).with_ignore_index(Some(255));
        cm.update_from_labels(&[0, 1, 1, 3], &[0, 1, 255, 7]);

        // 255 ignored, 7 out of range.
        assert_eq!(cm.total(), 2);
        assert_eq!(cm.class_iou()[2], None);
        assert_eq!(cm.class_iou()[3], None);
        assert_eq!(cm.mean_iou(), 1.0);
        assert_eq!(cm.pixel_accuracy(), 1.0);

        cm.reset();
        assert_eq!(cm.total(), 0);
        assert_eq!(cm.mean_iou(), 0.0);
        assert_eq!(cm.frequency_weighted_iou(), 0.0);
    }

    #[test]
    fn test_out_of_range_prediction_is_a_miss() {
        let mut cm = ConfusionMatrix::new(2);
        // targets:     0 0 1 1
        // predictions: 0 9 1 1
        cm.update_from_labels(&[0, 9, 1, 1], &[0, 0, 1, 1]);

        assert_eq!(cm.total(), 4);
        assert_eq!(cm.out_of_range_count(0), 1);
        assert_eq!(cm.count(0, 0), 1);
        assert_that!(cm.pixel_accuracy(), close_to(3.0 / 4.0, 1e-12));

        // recall: 1/2, 2/2; iou: 1/(2+1-1), 2/(2+2-2)
        assert_eq!(cm.class_accuracy(), vec![Some(0.5), Some(1.0)]);
        assert_eq!(cm.class_iou(), vec![Some(0.5), Some(1.0)]);

        let mut other = ConfusionMatrix::new(2);
        other.merge(&cm);
        assert_eq!(other.out_of_range_count(0), 1);
        assert_eq!(other.total(), 4);

        cm.reset();
        assert_eq!(cm.out_of_range_count(0), 0);
    }

    #[test]
    fn test_tensor_update_and_merge() {
        type B = NdArray<f32>;
        let device = Default::default();

        let predictions: Tensor<B, 3, Int> = Tensor::from_data([[[0, 1], [1, 1]]], &device);
        let targets: Tensor<B, 3, Int> = Tensor::from_data([[[0, 1], [0, 1]]], &device);

        let mut a = ConfusionMatrix::new(2);
        a.update(predictions, targets);
        assert_eq!(a.count(0, 1), 1);
        assert_eq!(a.count(1, 1), 2);

        let mut b = ConfusionMatrix::new(2);
        b.update_from_labels(&[0], &[0]);
        b.merge(&a);
        assert_eq!(b.total(), 5);
        assert_eq!(b.count(0, 0), 2);

        let json = serde_json::to_string(&b).unwrap();
        let restored: ConfusionMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, b);
    }
}
