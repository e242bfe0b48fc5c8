//! # `VGG` Feature Backbone
//!
//! A `VGG` backbone is a sequence of stages; each stage is a run of
//! 3x3 "same" convs (optionally batch normalized) followed by a 2x2/2 max pool.
//!
//! The last three stage pools are the FCN taps (``pool3``, ``pool4``, ``pool5``
//! for the 5-stage models).

use crate::layers::blocks::conv_act::{ConvAct2d, ConvAct2dConfig, ConvAct2dMeta};
use crate::models::backbone::{BackboneMeta, FeatureTaps};
use bimm_contracts::{ShapeContract, shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// `VGG-11` stage widths (configuration "A").
pub static VGG11_STAGES: &[&[usize]] = &[&[64], &[128], &[256, 256], &[512, 512], &[512, 512]];

/// `VGG-13` stage widths (configuration "B").
pub static VGG13_STAGES: &[&[usize]] = &[
    &[64, 64],
    &[128, 128],
    &[256, 256],
    &[512, 512],
    &[512, 512],
];

/// `VGG-16` stage widths (configuration "D").
pub static VGG16_STAGES: &[&[usize]] = &[
    &[64, 64],
    &[128, 128],
    &[256, 256, 256],
    &[512, 512, 512],
    &[512, 512, 512],
];

/// `VGG-19` stage widths (configuration "E").
pub static VGG19_STAGES: &[&[usize]] = &[
    &[64, 64],
    &[128, 128],
    &[256, 256, 256, 256],
    &[512, 512, 512, 512],
    &[512, 512, 512, 512],
];

/// Convert a static stage table to config form.
pub fn stages_to_vec(stages: &[&[usize]]) -> Vec<Vec<usize>> {
    stages.iter().map(|stage| stage.to_vec()).collect()
}

/// [`Vgg`] Config.
#[derive(Config, Debug)]
pub struct VggConfig {
    /// Output widths of each conv, grouped by stage.
    pub stages: Vec<Vec<usize>>,

    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Insert batch norm after each conv.
    #[config(default = false)]
    pub batch_norm: bool,
}

impl VggConfig {
    /// `VGG-11`.
    pub fn vgg11() -> Self {
        Self::new(stages_to_vec(VGG11_STAGES))
    }

    /// `VGG-13`.
    pub fn vgg13() -> Self {
        Self::new(stages_to_vec(VGG13_STAGES))
    }

    /// `VGG-16`.
    pub fn vgg16() -> Self {
        Self::new(stages_to_vec(VGG16_STAGES))
    }

    /// `VGG-19`.
    pub fn vgg19() -> Self {
        Self::new(stages_to_vec(VGG19_STAGES))
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stages.len() < 3 {
            return Err(format!(
                "VGG needs at least 3 stages for FCN taps, found {}",
                self.stages.len()
            ));
        }
        if let Some(idx) = self.stages.iter().position(|stage| stage.is_empty()) {
            return Err(format!("stage {idx} has no convs"));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// The output width of the last conv of each stage.
    pub fn stage_widths(&self) -> Vec<usize> {
        self.stages
            .iter()
            .filter_map(|stage| stage.last().copied())
            .collect()
    }

    /// Initialize a [`Vgg`] backbone.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Vgg<B> {
        self.expect_valid();

        let mut in_channels = self.in_channels;
        let stages = self
            .stages
            .iter()
            .map(|widths| VggStage {
                convs: widths
                    .iter()
                    .map(|&out_channels| {
                        let block = ConvAct2dConfig::square(in_channels, out_channels, 3)
                            .with_batch_norm(self.batch_norm)
                            .init(device);
                        in_channels = out_channels;
                        block
                    })
                    .collect(),
            })
            .collect();

        Vgg {
            stages,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

impl BackboneMeta for VggConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn tap_channels(&self) -> [usize; 3] {
        let widths = self.stage_widths();
        let n = widths.len();
        [widths[n - 3], widths[n - 2], widths[n - 1]]
    }

    fn tap_strides(&self) -> [usize; 3] {
        let n = self.stages.len() as u32;
        [1 << (n - 2), 1 << (n - 1), 1 << n]
    }

    fn min_input_size(&self) -> usize {
        1 << self.stages.len()
    }
}

/// A run of convs followed by the shared pool.
#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    /// Conv/[norm]/relu blocks.
    pub convs: Vec<ConvAct2d<B>>,
}

impl<B: Backend> VggStage<B> {
    /// Output width of the stage.
    pub fn out_channels(&self) -> usize {
        self.convs[self.convs.len() - 1].out_channels()
    }

    /// Forward Pass; does not pool.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.convs.iter().fold(input, |x, conv| conv.forward(x))
    }
}

/// `VGG` feature backbone.
#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    /// The conv stages.
    pub stages: Vec<VggStage<B>>,

    /// The shared 2x2/2 pool.
    pub pool: MaxPool2d,
}

impl<B: Backend> BackboneMeta for Vgg<B> {
    fn in_channels(&self) -> usize {
        self.stages[0].convs[0].in_channels()
    }

    fn tap_channels(&self) -> [usize; 3] {
        self.to_config().tap_channels()
    }

    fn tap_strides(&self) -> [usize; 3] {
        self.to_config().tap_strides()
    }

    fn min_input_size(&self) -> usize {
        self.to_config().min_input_size()
    }
}

impl<B: Backend> Vgg<B> {
    /// Recover the [`VggConfig`] from the module structure.
    pub fn to_config(&self) -> VggConfig {
        VggConfig::new(
            self.stages
                .iter()
                .map(|stage| stage.convs.iter().map(|c| c.out_channels()).collect())
                .collect(),
        )
        .with_in_channels(self.in_channels())
        .with_batch_norm(self.stages[0].convs[0].has_norm())
    }

    /// Run the feature stack, collecting the last three stage pools.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``;
    ///   ``height`` and ``width`` should be multiples of ``2^stages``.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> FeatureTaps<B> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "in_channels",
            "height",
            "width",
        ];
        INPUT_CONTRACT.assert_shape(&input, &[("in_channels", self.in_channels())]);

        let n = self.stages.len();
        let mut taps = Vec::with_capacity(3);
        let mut x = input;
        for (idx, stage) in self.stages.iter().enumerate() {
            x = self.pool.forward(stage.forward(x));
            if idx + 3 >= n {
                taps.push(x.clone());
            }
        }

        let Ok([shallow, mid, deep]) = <[Tensor<B, 4>; 3]>::try_from(taps) else {
            unreachable!("backbone collects exactly three taps");
        };
        FeatureTaps { shallow, mid, deep }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_prefab_layouts() {
        let count = |config: VggConfig| config.stages.iter().map(|s| s.len()).sum::<usize>();
        assert_eq!(count(VggConfig::vgg11()), 8);
        assert_eq!(count(VggConfig::vgg13()), 10);
        assert_eq!(count(VggConfig::vgg16()), 13);
        assert_eq!(count(VggConfig::vgg19()), 16);

        let config = VggConfig::vgg16();
        assert_eq!(config.tap_channels(), [256, 512, 512]);
        assert_eq!(config.tap_strides(), [8, 16, 32]);
        assert_eq!(config.size_divisor(), 32);
        assert_eq!(config.min_input_size(), 32);
    }

    #[test]
    fn test_validation() {
        assert!(VggConfig::new(vec![vec![4], vec![8]]).try_validate().is_err());
        assert!(
            VggConfig::new(vec![vec![4], vec![], vec![8]])
                .try_validate()
                .is_err()
        );
        assert!(
            VggConfig::new(vec![vec![4], vec![8], vec![8]])
                .try_validate()
                .is_ok()
        );
    }

    #[test]
    fn test_forward_features() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = VggConfig::new(vec![vec![4], vec![6, 6], vec![8], vec![8, 10]])
            .with_batch_norm(true);
        assert_eq!(config.tap_strides(), [4, 8, 16]);

        let backbone: Vgg<B> = config.init(&device);
        assert_eq!(backbone.to_config().stages, config.stages);
        assert!(backbone.to_config().batch_norm);
        assert_eq!(backbone.tap_channels(), [6, 8, 10]);

        let input = Tensor::random([2, 3, 32, 48], Distribution::Default, &device);
        let taps = backbone.forward_features(input);

        assert_eq!(taps.shallow.dims(), [2, 6, 8, 12]);
        assert_eq!(taps.mid.dims(), [2, 8, 4, 6]);
        assert_eq!(taps.deep.dims(), [2, 10, 2, 3]);
    }
}
