//! # Segmentation Items

use serde::{Deserialize, Serialize};

/// Label for unlabeled / border pixels.
pub const IGNORE_INDEX: usize = 255;

/// One image and its per-pixel label mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationItem {
    /// ``[3, height, width]`` RGB values in ``[0, 1]``, row major.
    pub image: Vec<f32>,

    /// ``[height, width]`` class labels, row major.
    pub mask: Vec<usize>,

    /// Image height.
    pub height: usize,

    /// Image width.
    pub width: usize,
}

impl SegmentationItem {
    /// A black, all-background item.
    pub fn blank(
        height: usize,
        width: usize,
    ) -> Self {
        Self {
            image: vec![0.0; 3 * height * width],
            mask: vec![0; height * width],
            height,
            width,
        }
    }

    /// Check the buffer sizes against ``height`` and ``width``.
    pub fn try_validate(&self) -> Result<(), String> {
        let pixels = self.height * self.width;
        if self.image.len() != 3 * pixels || self.mask.len() != pixels {
            return Err(format!(
                "item buffers do not match [{}, {}]: image={}, mask={}",
                self.height,
                self.width,
                self.image.len(),
                self.mask.len()
            ));
        }
        Ok(())
    }

    /// Set the RGB value of pixel ``(y, x)``.
    pub fn set_rgb(
        &mut self,
        y: usize,
        x: usize,
        rgb: [f32; 3],
    ) {
        let plane = self.height * self.width;
        let offset = y * self.width + x;
        for (c, v) in rgb.into_iter().enumerate() {
            self.image[c * plane + offset] = v;
        }
    }

    /// The RGB value of pixel ``(y, x)``.
    pub fn rgb(
        &self,
        y: usize,
        x: usize,
    ) -> [f32; 3] {
        let plane = self.height * self.width;
        let offset = y * self.width + x;
        [0, 1, 2].map(|c| self.image[c * plane + offset])
    }

    /// The class label of pixel ``(y, x)``.
    pub fn label(
        &self,
        y: usize,
        x: usize,
    ) -> usize {
        self.mask[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixels() {
        let mut item = SegmentationItem::blank(2, 3);
        assert!(item.try_validate().is_ok());

        item.set_rgb(1, 2, [0.1, 0.2, 0.3]);
        assert_eq!(item.rgb(1, 2), [0.1, 0.2, 0.3]);
        assert_eq!(item.image[5], 0.1);
        assert_eq!(item.image[6 + 5], 0.2);
        assert_eq!(item.label(1, 2), 0);

        item.mask.pop();
        assert!(item.try_validate().is_err());
    }
}
