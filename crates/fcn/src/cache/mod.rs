//! # Module / Weight Caches
//!
//! * [`disk`] - the on-disk read-through download cache.
//! * [`weights`] - pretrained weights descriptors.
//! * [`prefabs`] - named, well-known model configs.

pub mod disk;
pub mod prefabs;
pub mod weights;
