//! # Image I/O
//!
//! Loading RGB images and label masks into [`SegmentationItem`]s, and
//! writing label masks as color-coded PNGs.
//!
//! Masks use the PASCAL VOC color map: label ``i`` gets [`label_color`]
//! ``(i)``, and [`IGNORE_INDEX`] is the cream border color.

use crate::data::item::{IGNORE_INDEX, SegmentationItem};
use anyhow::Context;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::Path;

/// The VOC color of `label`.
pub fn label_color(label: usize) -> [u8; 3] {
    let mut c = label;
    let mut rgb = [0u8; 3];
    for bit in (0..8).rev() {
        for (channel, value) in rgb.iter_mut().enumerate() {
            *value |= (((c >> channel) & 1) as u8) << bit;
        }
        c >>= 3;
    }
    rgb
}

/// Resize `image` unless it already has the target ``[height, width]``.
fn maybe_resize(
    image: RgbImage,
    size: Option<[usize; 2]>,
    filter: FilterType,
) -> RgbImage {
    match size {
        Some([h, w]) if [image.height() as usize, image.width() as usize] != [h, w] => {
            image::imageops::resize(&image, w as u32, h as u32, filter)
        }
        _ => image,
    }
}

/// Convert an RGB image to ``[3, height, width]`` values in ``[0, 1]``.
pub fn rgb_to_chw(image: &RgbImage) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut chw = vec![0.0; 3 * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * w + x) as usize;
        for c in 0..3 {
            chw[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }
    chw
}

/// Load an RGB image.
///
/// # Arguments
///
/// - `path`: any format the `image` crate decodes.
/// - `size`: optional ``[height, width]`` to resize to.
///
/// # Returns
///
/// ``(chw, height, width)``
pub fn load_rgb<P: AsRef<Path>>(
    path: P,
    size: Option<[usize; 2]>,
) -> anyhow::Result<(Vec<f32>, usize, usize)> {
    let path = path.as_ref();
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgb8();
    let image = maybe_resize(image, size, FilterType::Triangle);
    let (w, h) = image.dimensions();
    Ok((rgb_to_chw(&image), h as usize, w as usize))
}

/// Load a VOC color-coded label mask.
///
/// Colors outside the first `num_classes` labels map to [`IGNORE_INDEX`].
/// Resizing uses nearest neighbor sampling.
pub fn load_mask<P: AsRef<Path>>(
    path: P,
    num_classes: usize,
    size: Option<[usize; 2]>,
) -> anyhow::Result<(Vec<usize>, usize, usize)> {
    let path = path.as_ref();
    let image = image::open(path)
        .with_context(|| format!("failed to open mask {}", path.display()))?
        .to_rgb8();
    let image = maybe_resize(image, size, FilterType::Nearest);

    let palette: HashMap<[u8; 3], usize> = (0..num_classes)
        .map(|label| (label_color(label), label))
        .collect();

    let (w, h) = image.dimensions();
    let mask = image
        .pixels()
        .map(|pixel| *palette.get(&pixel.0).unwrap_or(&IGNORE_INDEX))
        .collect();
    Ok((mask, h as usize, w as usize))
}

/// Load an image and its label mask as one item.
pub fn load_segmentation_item<P: AsRef<Path>, Q: AsRef<Path>>(
    image_path: P,
    mask_path: Q,
    num_classes: usize,
    size: Option<[usize; 2]>,
) -> anyhow::Result<SegmentationItem> {
    let (image, height, width) = load_rgb(image_path, size)?;
    let (mask, _, _) = load_mask(mask_path, num_classes, Some([height, width]))?;

    let item = SegmentationItem {
        image,
        mask,
        height,
        width,
    };
    item.try_validate().map_err(anyhow::Error::msg)?;
    Ok(item)
}

/// Render a label mask with [`label_color`].
pub fn mask_to_image(
    mask: &[usize],
    height: usize,
    width: usize,
) -> anyhow::Result<RgbImage> {
    anyhow::ensure!(
        mask.len() == height * width,
        "mask length {} does not match [{height}, {width}]",
        mask.len()
    );
    Ok(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Rgb(label_color(mask[y as usize * width + x as usize]))
    }))
}

/// Save a label mask as a VOC color-coded PNG.
pub fn save_mask_png<P: AsRef<Path>>(
    mask: &[usize],
    height: usize,
    width: usize,
    path: P,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    mask_to_image(mask, height, width)?
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write mask {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote mask");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_colors() {
        assert_eq!(label_color(0), [0, 0, 0]);
        assert_eq!(label_color(1), [128, 0, 0]);
        assert_eq!(label_color(2), [0, 128, 0]);
        assert_eq!(label_color(3), [128, 128, 0]);
        assert_eq!(label_color(15), [192, 128, 128]);
        assert_eq!(label_color(IGNORE_INDEX), [224, 224, 192]);
    }

    #[test]
    fn test_mask_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");

        let mask = vec![0, 1, 2, 3, IGNORE_INDEX, 1];
        save_mask_png(&mask, 2, 3, &path).unwrap();

        let (loaded, h, w) = load_mask(&path, 4, None).unwrap();
        assert_eq!([h, w], [2, 3]);
        assert_eq!(loaded, mask);

        // Fewer classes: label 3 is now unknown.
        let (loaded, _, _) = load_mask(&path, 3, None).unwrap();
        assert_eq!(loaded[3], IGNORE_INDEX);

        assert!(save_mask_png(&mask, 2, 2, &path).is_err());
    }

    #[test]
    fn test_load_item_resized() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("image.png");
        let mask_path = dir.path().join("mask.png");

        RgbImage::from_pixel(8, 4, Rgb([255, 0, 51]))
            .save(&image_path)
            .unwrap();
        save_mask_png(&[2; 32], 4, 8, &mask_path).unwrap();

        let item = load_segmentation_item(&image_path, &mask_path, 3, Some([2, 4])).unwrap();
        assert_eq!([item.height, item.width], [2, 4]);
        assert_eq!(item.rgb(1, 3), [1.0, 0.0, 0.2]);
        assert!(item.mask.iter().all(|&label| label == 2));

        assert!(load_rgb(dir.path().join("missing.png"), None).is_err());
    }
}
