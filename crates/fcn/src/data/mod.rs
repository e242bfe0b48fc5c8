//! # Segmentation Data
//!
//! * [`item`] - the [`SegmentationItem`] image / mask pair.
//! * [`shapes`] - a synthetic, seeded shapes dataset.
//! * [`batcher`] - burn batching with ImageNet normalization.
//! * [`images`] - image and mask file I/O.

pub mod batcher;
pub mod images;
pub mod item;
pub mod shapes;

pub use batcher::{SegmentationBatch, SegmentationBatcher};
pub use item::{IGNORE_INDEX, SegmentationItem};
pub use shapes::{ShapesDataset, ShapesDatasetConfig};
