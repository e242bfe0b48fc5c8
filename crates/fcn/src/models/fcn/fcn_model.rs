//! # Fully Convolutional Network
//!
//! An [`Fcn`] scores the deepest backbone tap, then (for the 16s / 8s
//! variants) upsamples and fuses scores predicted from the shallower taps,
//! and finally upsamples to input resolution:
//!
//! ```text
//! deep  -> head -> score_deep ------------+
//!                                         up x(deep/mid)
//! mid   -> score_mid ------------------> (+)            (16s, 8s)
//!                                         up x(mid/shallow)
//! shallow -> score_shallow ------------> (+)            (8s)
//!                                         up to input
//! ```
//!
//! Inputs are zero padded to a multiple of the backbone size divisor,
//! and the logits are cropped back to the input size.

use crate::layers::align::{crop_spatial, pad_to_multiple, spatial_dims};
use crate::layers::upsample::{Upsample2d, Upsample2dConfig, Upsample2dMeta, UpsampleMode};
use crate::models::alexnet::AlexNetConfig;
use crate::models::backbone::BackboneMeta;
use crate::models::fcn::backbone::{Backbone, BackboneConfig};
use crate::models::fcn::head::{FcnHead, FcnHeadConfig};
use crate::models::resnet::ResNetConfig;
use crate::models::vgg::VggConfig;
use bimm_contracts::{ShapeContract, shape_contract};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Int, Tensor};

/// Which backbone taps are fused into the class scores.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum FcnVariant {
    /// Deep tap only; a single stride-32 upsample.
    Fcn32s,

    /// Deep and mid taps.
    Fcn16s,

    /// Deep, mid and shallow taps.
    Fcn8s,
}

impl FcnVariant {
    /// The number of skip taps fused.
    pub fn num_skips(&self) -> usize {
        match self {
            Self::Fcn32s => 0,
            Self::Fcn16s => 1,
            Self::Fcn8s => 2,
        }
    }

    /// Lookup a variant by its skip count.
    pub fn from_num_skips(num_skips: usize) -> Option<Self> {
        match num_skips {
            0 => Some(Self::Fcn32s),
            1 => Some(Self::Fcn16s),
            2 => Some(Self::Fcn8s),
            _ => None,
        }
    }

    /// The variant's short name; ``"32s"``, ``"16s"`` or ``"8s"``.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fcn32s => "32s",
            Self::Fcn16s => "16s",
            Self::Fcn8s => "8s",
        }
    }
}

/// [`Fcn`] Config.
#[derive(Config, Debug)]
pub struct FcnConfig {
    /// The feature backbone.
    pub backbone: BackboneConfig,

    /// The feature head over the deep tap.
    pub head: FcnHeadConfig,

    /// Number of output classes.
    pub num_classes: usize,

    /// Skip fusion variant.
    #[config(default = "FcnVariant::Fcn8s")]
    pub variant: FcnVariant,

    /// Score upsampling mode.
    #[config(default = "UpsampleMode::Deconv")]
    pub upsample_mode: UpsampleMode,
}

impl FcnConfig {
    /// A config with the default head for the backbone family.
    pub fn from_backbone<C: Into<BackboneConfig>>(
        backbone: C,
        num_classes: usize,
    ) -> Self {
        let backbone = backbone.into();
        let deep = backbone.tap_channels()[2];
        let head = match &backbone {
            BackboneConfig::AlexNet(_) => FcnHeadConfig::alexnet(deep),
            BackboneConfig::Vgg(_) => FcnHeadConfig::vgg(deep),
            BackboneConfig::ResNet(_) => FcnHeadConfig::compact(deep),
        };
        Self::new(backbone, head, num_classes)
    }

    /// FCN-AlexNet.
    pub fn alexnet(num_classes: usize) -> Self {
        Self::from_backbone(AlexNetConfig::new(), num_classes)
    }

    /// FCN-VGG16.
    pub fn vgg16(num_classes: usize) -> Self {
        Self::from_backbone(VggConfig::vgg16(), num_classes)
    }

    /// FCN-ResNet50, dilated to output stride 8.
    pub fn resnet50(num_classes: usize) -> Self {
        Self::from_backbone(ResNetConfig::resnet50().with_output_stride(8), num_classes)
    }

    /// Upsample factors ``[deep -> mid, mid -> shallow, last fused -> input]``.
    ///
    /// Unused stages are `None`.
    pub fn upsample_factors(&self) -> [Option<usize>; 3] {
        let [shallow, mid, deep] = self.backbone.tap_strides();
        match self.variant {
            FcnVariant::Fcn32s => [None, None, Some(deep)],
            FcnVariant::Fcn16s => [Some(deep / mid), None, Some(mid)],
            FcnVariant::Fcn8s => [Some(deep / mid), Some(mid / shallow), Some(shallow)],
        }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        self.backbone.try_validate()?;
        self.head.try_validate()?;

        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }

        let deep = self.backbone.tap_channels()[2];
        if self.head.in_channels != deep {
            return Err(format!(
                "head in_channels ({}) != deep tap channels ({})",
                self.head.in_channels, deep
            ));
        }

        let [shallow, mid, deep] = self.backbone.tap_strides();
        if mid % shallow != 0 || deep % mid != 0 {
            return Err(format!(
                "tap strides must nest: {:?}",
                [shallow, mid, deep]
            ));
        }

        for factor in self.upsample_factors().into_iter().flatten() {
            Upsample2dConfig::new(self.num_classes, factor)
                .with_mode(self.upsample_mode.clone())
                .try_validate()?;
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize an [`Fcn`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Fcn<B> {
        self.expect_valid();

        let backbone = self.backbone.init(device);
        let head = self.head.init(device);
        self.init_with(backbone, head, device)
    }

    /// Assemble an [`Fcn`] around an existing backbone and head.
    ///
    /// Scorers and upsamplers are freshly initialized.
    pub fn init_with<B: Backend>(
        &self,
        backbone: Backbone<B>,
        head: FcnHead<B>,
        device: &B::Device,
    ) -> Fcn<B> {
        self.expect_valid();

        let [shallow_channels, mid_channels, _] = self.backbone.tap_channels();
        let [up_deep, up_mid, up_final] = self.upsample_factors();
        let num_skips = self.variant.num_skips();

        let upsample = |factor: usize| {
            Upsample2dConfig::new(self.num_classes, factor)
                .with_mode(self.upsample_mode.clone())
                .init(device)
        };

        Fcn {
            backbone,
            head,
            score_deep: score_conv(self.head.hidden_channels, self.num_classes, device),
            score_mid: (num_skips >= 1)
                .then(|| zero_score_conv(mid_channels, self.num_classes, device)),
            score_shallow: (num_skips >= 2)
                .then(|| zero_score_conv(shallow_channels, self.num_classes, device)),
            up_deep: up_deep.map(upsample),
            up_mid: up_mid.map(upsample),
            up_final: upsample(up_final.unwrap_or(1)),
        }
    }
}

fn score_conv<B: Backend>(
    in_channels: usize,
    num_classes: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, num_classes], [1, 1]).init(device)
}

/// A 1x1 scorer with zero weights and bias.
///
/// Fresh skip branches contribute nothing, so a new 16s / 8s model
/// starts from its coarser path.
fn zero_score_conv<B: Backend>(
    in_channels: usize,
    num_classes: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let mut conv = score_conv(in_channels, num_classes, device);
    conv.weight = Param::from_tensor(conv.weight.val().zeros_like());
    conv.bias = conv.bias.map(|b| Param::from_tensor(b.val().zeros_like()));
    conv
}

/// Fully Convolutional Network.
#[derive(Module, Debug)]
pub struct Fcn<B: Backend> {
    /// Feature backbone.
    pub backbone: Backbone<B>,

    /// Feature head over the deep tap.
    pub head: FcnHead<B>,

    /// Deep tap scorer.
    pub score_deep: Conv2d<B>,

    /// Mid tap scorer; 16s and 8s.
    pub score_mid: Option<Conv2d<B>>,

    /// Shallow tap scorer; 8s.
    pub score_shallow: Option<Conv2d<B>>,

    /// Deep to mid upsample; 16s and 8s.
    pub up_deep: Option<Upsample2d<B>>,

    /// Mid to shallow upsample; 8s.
    pub up_mid: Option<Upsample2d<B>>,

    /// Final upsample to (padded) input resolution.
    pub up_final: Upsample2d<B>,
}

impl<B: Backend> BackboneMeta for Fcn<B> {
    fn in_channels(&self) -> usize {
        self.backbone.in_channels()
    }

    fn tap_channels(&self) -> [usize; 3] {
        self.backbone.tap_channels()
    }

    fn tap_strides(&self) -> [usize; 3] {
        self.backbone.tap_strides()
    }

    fn size_divisor(&self) -> usize {
        self.backbone.size_divisor()
    }

    fn min_input_size(&self) -> usize {
        self.backbone.min_input_size()
    }
}

impl<B: Backend> Fcn<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.up_final.channels()
    }

    /// The skip fusion variant.
    pub fn variant(&self) -> FcnVariant {
        match (&self.score_mid, &self.score_shallow) {
            (Some(_), Some(_)) => FcnVariant::Fcn8s,
            (Some(_), None) => FcnVariant::Fcn16s,
            _ => FcnVariant::Fcn32s,
        }
    }

    /// Recover the [`FcnConfig`] from the module structure.
    pub fn to_config(&self) -> FcnConfig {
        let upsample_mode = [
            self.up_final.mode(),
            self.up_deep.as_ref().and_then(|up| up.mode()),
            self.up_mid.as_ref().and_then(|up| up.mode()),
        ]
        .into_iter()
        .flatten()
        .next()
        .unwrap_or(UpsampleMode::Deconv);

        FcnConfig::new(
            self.backbone.to_config(),
            self.head.to_config(),
            self.num_classes(),
        )
        .with_variant(self.variant())
        .with_upsample_mode(upsample_mode)
    }

    /// Replace the scorers and upsamplers for a new class count.
    ///
    /// The backbone and head are kept.
    pub fn with_classes(
        self,
        num_classes: usize,
    ) -> Self {
        let mut config = self.to_config();
        config.num_classes = num_classes;
        let device = self.devices()[0].clone();
        tracing::debug!(num_classes, "re-heading fcn");
        config.init_with(self.backbone, self.head, &device)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `images`: ``[batch, in_channels, height, width]``; ``height`` and
    ///   ``width`` must be at least ``min_input_size()``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes, height, width]`` logits.
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        static INPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "in_channels",
            "height",
            "width",
        ];
        let [batch, height, width] = INPUT_CONTRACT.unpack_shape(
            &images,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())],
        );
        let min_size = self.min_input_size();
        assert!(
            height >= min_size && width >= min_size,
            "input [{height}, {width}] is smaller than the minimum {min_size}"
        );

        let (x, _) = pad_to_multiple(images, self.size_divisor());
        let padded = spatial_dims(&x);

        let taps = self.backbone.forward_features(x);

        let mut score = self.score_deep.forward(self.head.forward(taps.deep));

        if let (Some(up), Some(scorer)) = (&self.up_deep, &self.score_mid) {
            let skip = scorer.forward(taps.mid);
            score = up.forward_to(score, spatial_dims(&skip)) + skip;
        }
        if let (Some(up), Some(scorer)) = (&self.up_mid, &self.score_shallow) {
            let skip = scorer.forward(taps.shallow);
            score = up.forward_to(score, spatial_dims(&skip)) + skip;
        }

        let logits = crop_spatial(
            self.up_final.forward_to(score, padded),
            [0, 0],
            [height, width],
        );

        static OUTPUT_CONTRACT: ShapeContract = shape_contract![
            "batch",
            "num_classes",
            "height",
            "width",
        ];
        OUTPUT_CONTRACT.assert_shape(
            &logits,
            &[
                ("batch", batch),
                ("num_classes", self.num_classes()),
                ("height", height),
                ("width", width)
            ],
        );
        logits
    }

    /// Predict per-pixel class labels.
    ///
    /// # Returns
    ///
    /// ``[batch, height, width]`` argmax labels.
    pub fn predict(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 3, Int> {
        self.forward(images).argmax(1).squeeze::<3>(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn tiny_vgg(variant: FcnVariant) -> FcnConfig {
        let backbone = VggConfig::new(vec![vec![4], vec![4], vec![6], vec![8], vec![8]]);
        let head = FcnHeadConfig::new(8, 12).with_dropout(0.0);
        FcnConfig::new(backbone.into(), head, 3).with_variant(variant)
    }

    #[test]
    fn test_variant() {
        for variant in [FcnVariant::Fcn32s, FcnVariant::Fcn16s, FcnVariant::Fcn8s] {
            assert_eq!(FcnVariant::from_num_skips(variant.num_skips()), Some(variant));
        }
        assert_eq!(FcnVariant::from_num_skips(3), None);
        assert_eq!(FcnVariant::Fcn16s.name(), "16s");
    }

    #[test]
    fn test_upsample_factors() {
        assert_eq!(
            FcnConfig::vgg16(21).upsample_factors(),
            [Some(2), Some(2), Some(8)]
        );
        assert_eq!(
            FcnConfig::vgg16(21)
                .with_variant(FcnVariant::Fcn32s)
                .upsample_factors(),
            [None, None, Some(32)]
        );
        assert_eq!(
            FcnConfig::resnet50(21).upsample_factors(),
            [Some(1), Some(1), Some(8)]
        );
        assert_eq!(
            FcnConfig::from_backbone(ResNetConfig::resnet50().with_output_stride(16), 21)
                .with_variant(FcnVariant::Fcn16s)
                .upsample_factors(),
            [Some(1), None, Some(16)]
        );
    }

    #[test]
    fn test_validation() {
        assert!(FcnConfig::vgg16(21).try_validate().is_ok());
        assert!(FcnConfig::alexnet(21).try_validate().is_ok());
        assert!(FcnConfig::resnet50(21).try_validate().is_ok());

        assert!(FcnConfig::vgg16(0).try_validate().is_err());

        let mismatched = FcnConfig::new(
            VggConfig::vgg16().into(),
            FcnHeadConfig::vgg(256),
            21,
        );
        assert!(mismatched.try_validate().is_err());
    }

    #[test]
    fn test_forward_shapes_all_variants() {
        let device = Default::default();
        for variant in [FcnVariant::Fcn32s, FcnVariant::Fcn16s, FcnVariant::Fcn8s] {
            let model: Fcn<B> = tiny_vgg(variant).init(&device);
            assert_eq!(model.variant(), variant);
            assert_eq!(model.num_classes(), 3);

            // Not a multiple of 32: padded, then cropped back.
            let images = Tensor::random([2, 3, 45, 70], Distribution::Default, &device);
            assert_eq!(model.forward(images.clone()).dims(), [2, 3, 45, 70]);

            let labels = model.predict(images);
            assert_eq!(labels.dims(), [2, 45, 70]);
            assert!(labels.max().into_scalar() < 3);
        }
    }

    #[test]
    #[should_panic(expected = "smaller than the minimum")]
    fn test_forward_too_small() {
        let device = Default::default();
        let model: Fcn<B> = tiny_vgg(FcnVariant::Fcn32s).init(&device);
        let images = Tensor::random([1, 3, 16, 64], Distribution::Default, &device);
        model.forward(images);
    }

    #[test]
    fn test_fresh_skips_follow_the_coarse_path() {
        let device = Default::default();
        let model: Fcn<B> = tiny_vgg(FcnVariant::Fcn8s).init(&device);

        let images = Tensor::random([1, 3, 64, 64], Distribution::Default, &device);
        let actual = model.forward(images.clone());

        let taps = model.backbone.forward_features(images);
        let score = model.score_deep.forward(model.head.forward(taps.deep));
        let score = model.up_deep.as_ref().unwrap().forward(score);
        let score = model.up_mid.as_ref().unwrap().forward(score);
        let expected = model.up_final.forward(score);

        let max_err = (actual - expected).abs().max().into_scalar();
        assert!(max_err < 1e-5, "max_err: {max_err}");
    }

    #[test]
    fn test_resnet_and_alexnet_forward() {
        let device = Default::default();

        let resnet = FcnConfig::from_backbone(
            ResNetConfig::new([1, 1, 1, 1]).with_output_stride(8),
            2,
        );
        let model: Fcn<B> = resnet.init(&device);
        let images = Tensor::random([1, 3, 30, 41], Distribution::Default, &device);
        assert_eq!(model.forward(images).dims(), [1, 2, 30, 41]);

        let alexnet = FcnConfig::new(
            AlexNetConfig::new().with_channels([4, 6, 6, 6, 4]).into(),
            FcnHeadConfig::new(4, 8).with_kernel_size(6),
            2,
        );
        let model: Fcn<B> = alexnet.init(&device);
        let images = Tensor::random([1, 3, 70, 64], Distribution::Default, &device);
        assert_eq!(model.forward(images).dims(), [1, 2, 70, 64]);
    }

    #[test]
    fn test_alexnet_skip_fusion_covers_the_border() {
        // 224 -> taps of 27, 13, 6: the skip paths fall short of the input.
        let device = Default::default();
        let config = FcnConfig::new(
            AlexNetConfig::new().with_channels([4, 6, 6, 6, 4]).into(),
            FcnHeadConfig::new(4, 8).with_kernel_size(6).with_dropout(0.0),
            2,
        );

        for variant in [FcnVariant::Fcn16s, FcnVariant::Fcn8s] {
            let mut model: Fcn<B> = config.clone().with_variant(variant).init(&device);
            let [shallow, mid, _] = model.tap_channels();
            model.score_mid = Some(score_conv(mid, 2, &device));
            if variant == FcnVariant::Fcn8s {
                model.score_shallow = Some(score_conv(shallow, 2, &device));
            }

            let images = Tensor::random([1, 3, 224, 224], Distribution::Default, &device);
            let logits = model.forward(images);
            assert_eq!(logits.dims(), [1, 2, 224, 224]);

            let bottom = logits
                .clone()
                .slice([0..1, 0..2, 216..224, 0..224])
                .abs()
                .max()
                .into_scalar();
            let right = logits
                .slice([0..1, 0..2, 0..224, 216..224])
                .abs()
                .max()
                .into_scalar();
            assert!(
                bottom > 0.0 && right > 0.0,
                "{variant:?}: bottom {bottom}, right {right}"
            );
        }
    }

    #[test]
    fn test_to_config_and_with_classes() {
        let device = Default::default();
        let config = tiny_vgg(FcnVariant::Fcn16s).with_upsample_mode(UpsampleMode::Bilinear);
        let model: Fcn<B> = config.init(&device);

        let round_trip = model.to_config();
        assert_eq!(round_trip.variant, FcnVariant::Fcn16s);
        assert_eq!(round_trip.upsample_mode, UpsampleMode::Bilinear);
        assert_eq!(round_trip.num_classes, 3);
        assert_eq!(round_trip.head.hidden_channels, 12);

        let expected_fc6 = model.head.fc6.conv.weight.val();
        let model = model.with_classes(5);
        assert_eq!(model.num_classes(), 5);
        assert_eq!(model.variant(), FcnVariant::Fcn16s);
        model
            .head
            .fc6
            .conv
            .weight
            .val()
            .to_data()
            .assert_eq(&expected_fc6.to_data(), true);

        let images = Tensor::random([1, 3, 32, 32], Distribution::Default, &device);
        assert_eq!(model.forward(images).dims(), [1, 5, 32, 32]);
    }
}
