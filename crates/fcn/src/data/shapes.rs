//! # Synthetic Shapes Dataset
//!
//! Randomly placed, randomly colored rectangles, ellipses and triangles
//! over a noisy background. Every item is a pure function of the dataset
//! seed and its index, so the dataset needs no storage.

use crate::data::item::SegmentationItem;
use burn::config::Config;
use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Class names, by label.
pub const SHAPE_CLASSES: [&str; 4] = ["background", "rectangle", "ellipse", "triangle"];

/// [`ShapesDataset`] Config.
#[derive(Config, Debug)]
pub struct ShapesDatasetConfig {
    /// Number of items.
    pub len: usize,

    /// Image height.
    #[config(default = 64)]
    pub height: usize,

    /// Image width.
    #[config(default = 64)]
    pub width: usize,

    /// Maximum shapes per image; at least one is drawn.
    #[config(default = 3)]
    pub max_shapes: usize,

    /// Dataset seed.
    #[config(default = 0)]
    pub seed: u64,
}

impl ShapesDatasetConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.height < 8 || self.width < 8 {
            return Err(format!(
                "shapes images must be at least 8x8: [{}, {}]",
                self.height, self.width
            ));
        }
        if self.max_shapes == 0 {
            return Err("max_shapes must be > 0".to_string());
        }
        Ok(())
    }

    /// Initialize a [`ShapesDataset`].
    pub fn init(&self) -> ShapesDataset {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
        ShapesDataset {
            config: self.clone(),
        }
    }
}

/// Deterministic synthetic shapes segmentation dataset.
#[derive(Debug, Clone)]
pub struct ShapesDataset {
    config: ShapesDatasetConfig,
}

impl ShapesDataset {
    /// The dataset config.
    pub fn config(&self) -> &ShapesDatasetConfig {
        &self.config
    }

    /// Number of classes, background included.
    pub fn num_classes(&self) -> usize {
        SHAPE_CLASSES.len()
    }

    fn item_rng(
        &self,
        index: usize,
    ) -> StdRng {
        // splitmix-style mixing keeps neighboring indices uncorrelated.
        let mut z = self
            .config
            .seed
            .wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        StdRng::seed_from_u64(z ^ (z >> 31))
    }

    /// Render item `index`.
    pub fn render(
        &self,
        index: usize,
    ) -> SegmentationItem {
        let ShapesDatasetConfig {
            height,
            width,
            max_shapes,
            ..
        } = self.config;
        let mut rng = self.item_rng(index);
        let mut item = SegmentationItem::blank(height, width);

        let base: [f32; 3] = [0, 1, 2].map(|_| rng.random_range(0.0..0.35));
        for y in 0..height {
            for x in 0..width {
                let rgb = base.map(|v| (v + rng.random_range(-0.05..0.05)).clamp(0.0, 1.0));
                item.set_rgb(y, x, rgb);
            }
        }

        let num_shapes = rng.random_range(1..=max_shapes);
        for _ in 0..num_shapes {
            let shape = Shape::sample(&mut rng, height, width);
            let color: [f32; 3] = [0, 1, 2].map(|_| rng.random_range(0.45..1.0));

            let [y0, x0, y1, x1] = shape.bounds(height, width);
            for y in y0..y1 {
                for x in x0..x1 {
                    if shape.contains(y as f32 + 0.5, x as f32 + 0.5) {
                        item.set_rgb(y, x, color);
                        item.mask[y * width + x] = shape.label();
                    }
                }
            }
        }

        item
    }
}

impl Dataset<SegmentationItem> for ShapesDataset {
    fn get(
        &self,
        index: usize,
    ) -> Option<SegmentationItem> {
        (index < self.config.len).then(|| self.render(index))
    }

    fn len(&self) -> usize {
        self.config.len
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Rectangle {
        center: [f32; 2],
        half: [f32; 2],
    },
    Ellipse {
        center: [f32; 2],
        radii: [f32; 2],
    },
    Triangle {
        points: [[f32; 2]; 3],
    },
}

impl Shape {
    fn sample(
        rng: &mut StdRng,
        height: usize,
        width: usize,
    ) -> Self {
        let (h, w) = (height as f32, width as f32);
        let center = [rng.random_range(0.2..0.8) * h, rng.random_range(0.2..0.8) * w];
        let extent = [
            rng.random_range(0.1..0.3) * h,
            rng.random_range(0.1..0.3) * w,
        ];

        match rng.random_range(1..SHAPE_CLASSES.len()) {
            1 => Shape::Rectangle {
                center,
                half: extent,
            },
            2 => Shape::Ellipse {
                center,
                radii: extent,
            },
            _ => {
                let [cy, cx] = center;
                let [ey, ex] = extent;
                Shape::Triangle {
                    points: [
                        [cy - ey, cx + rng.random_range(-ex..ex)],
                        [cy + ey, cx - ex],
                        [cy + ey, cx + ex],
                    ],
                }
            }
        }
    }

    fn label(&self) -> usize {
        match self {
            Shape::Rectangle { .. } => 1,
            Shape::Ellipse { .. } => 2,
            Shape::Triangle { .. } => 3,
        }
    }

    /// Clipped ``[y0, x0, y1, x1)`` pixel bounds.
    fn bounds(
        &self,
        height: usize,
        width: usize,
    ) -> [usize; 4] {
        let (lo, hi) = match self {
            Shape::Rectangle { center, half: ext } | Shape::Ellipse { center, radii: ext } => (
                [center[0] - ext[0], center[1] - ext[1]],
                [center[0] + ext[0], center[1] + ext[1]],
            ),
            Shape::Triangle { points } => points.iter().fold(
                ([f32::MAX; 2], [f32::MIN; 2]),
                |(lo, hi), p| {
                    (
                        [lo[0].min(p[0]), lo[1].min(p[1])],
                        [hi[0].max(p[0]), hi[1].max(p[1])],
                    )
                },
            ),
        };
        let clip = |v: f32, max: usize| (v.max(0.0) as usize).min(max);
        [
            clip(lo[0].floor(), height),
            clip(lo[1].floor(), width),
            clip(hi[0].ceil(), height),
            clip(hi[1].ceil(), width),
        ]
    }

    fn contains(
        &self,
        y: f32,
        x: f32,
    ) -> bool {
        match self {
            Shape::Rectangle { center, half } => {
                (y - center[0]).abs() <= half[0] && (x - center[1]).abs() <= half[1]
            }
            Shape::Ellipse { center, radii } => {
                let dy = (y - center[0]) / radii[0];
                let dx = (x - center[1]) / radii[1];
                dy * dy + dx * dx <= 1.0
            }
            Shape::Triangle { points: [a, b, c] } => {
                let edge = |p: &[f32; 2], q: &[f32; 2]| {
                    (q[1] - p[1]) * (y - p[0]) - (q[0] - p[0]) * (x - p[1])
                };
                let (d1, d2, d3) = (edge(a, b), edge(b, c), edge(c, a));
                let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
                let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
                !(has_neg && has_pos)
            }
        }
    }
}
