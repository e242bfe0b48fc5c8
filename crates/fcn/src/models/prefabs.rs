//! # Well-Known FCN Configs
//!
//! The classic FCN configurations, each paired with the torchvision
//! ImageNet weights for its backbone. All prefabs score the 21
//! PASCAL VOC classes; use [`Fcn::with_classes`] for other label sets.

use crate::cache::disk::DiskCacheConfig;
use crate::cache::prefabs::{StaticPreFabConfig, StaticPreFabMap};
use crate::cache::weights::{StaticPretrainedWeightsDescriptor, StaticPretrainedWeightsMap};
use crate::models::alexnet::AlexNetConfig;
use crate::models::fcn::{Fcn, FcnConfig, FcnVariant};
use crate::models::resnet::ResNetConfig;
use crate::models::vgg::VggConfig;
use burn::prelude::Backend;

/// PASCAL VOC class count (20 objects + background).
pub const VOC_NUM_CLASSES: usize = 21;

/// Name of the torchvision ImageNet weights in each prefab.
pub const TORCHVISION_IN1K: &str = "tv_in1k";

static ALEXNET_TV_WEIGHTS: StaticPretrainedWeightsMap = StaticPretrainedWeightsMap {
    items: &[&StaticPretrainedWeightsDescriptor {
        name: TORCHVISION_IN1K,
        description: "AlexNet pretrained on ImageNet",
        license: Some("bsd-3-clause"),
        origin: Some("https://github.com/pytorch/vision"),
        urls: &["https://download.pytorch.org/models/alexnet-owt-7be5be79.pth"],
    }],
};

static VGG16_TV_WEIGHTS: StaticPretrainedWeightsMap = StaticPretrainedWeightsMap {
    items: &[&StaticPretrainedWeightsDescriptor {
        name: TORCHVISION_IN1K,
        description: "VGG-16 pretrained on ImageNet",
        license: Some("bsd-3-clause"),
        origin: Some("https://github.com/pytorch/vision"),
        urls: &["https://download.pytorch.org/models/vgg16-397923af.pth"],
    }],
};

static VGG16_BN_TV_WEIGHTS: StaticPretrainedWeightsMap = StaticPretrainedWeightsMap {
    items: &[&StaticPretrainedWeightsDescriptor {
        name: TORCHVISION_IN1K,
        description: "VGG-16-BN pretrained on ImageNet",
        license: Some("bsd-3-clause"),
        origin: Some("https://github.com/pytorch/vision"),
        urls: &["https://download.pytorch.org/models/vgg16_bn-6c64b313.pth"],
    }],
};

static RESNET18_TV_WEIGHTS: StaticPretrainedWeightsMap = StaticPretrainedWeightsMap {
    items: &[&StaticPretrainedWeightsDescriptor {
        name: TORCHVISION_IN1K,
        description: "ResNet-18 pretrained on ImageNet",
        license: Some("bsd-3-clause"),
        origin: Some("https://github.com/pytorch/vision"),
        urls: &["https://download.pytorch.org/models/resnet18-f37072fd.pth"],
    }],
};

static RESNET50_TV_WEIGHTS: StaticPretrainedWeightsMap = StaticPretrainedWeightsMap {
    items: &[&StaticPretrainedWeightsDescriptor {
        name: TORCHVISION_IN1K,
        description: "ResNet-50 pretrained on ImageNet",
        license: Some("bsd-3-clause"),
        origin: Some("https://github.com/pytorch/vision"),
        urls: &["https://download.pytorch.org/models/resnet50-0676ba61.pth"],
    }],
};

/// Well-known [`FcnConfig`]s.
pub static PREFAB_FCN_MAP: StaticPreFabMap<FcnConfig> = StaticPreFabMap {
    name: "fcn",
    description: "Well-known FCN configs",
    items: &[
        &StaticPreFabConfig {
            name: "fcn32s_alexnet",
            description: "FCN-32s over the AlexNet features",
            builder: || {
                FcnConfig::from_backbone(AlexNetConfig::new(), VOC_NUM_CLASSES)
                    .with_variant(FcnVariant::Fcn32s)
            },
            weights: Some(&ALEXNET_TV_WEIGHTS),
        },
        &StaticPreFabConfig {
            name: "fcn32s_vgg16",
            description: "FCN-32s over VGG-16",
            builder: || {
                FcnConfig::from_backbone(VggConfig::vgg16(), VOC_NUM_CLASSES)
                    .with_variant(FcnVariant::Fcn32s)
            },
            weights: Some(&VGG16_TV_WEIGHTS),
        },
        &StaticPreFabConfig {
            name: "fcn16s_vgg16",
            description: "FCN-16s over VGG-16; fuses pool4",
            builder: || {
                FcnConfig::from_backbone(VggConfig::vgg16(), VOC_NUM_CLASSES)
                    .with_variant(FcnVariant::Fcn16s)
            },
            weights: Some(&VGG16_TV_WEIGHTS),
        },
        &StaticPreFabConfig {
            name: "fcn8s_vgg16",
            description: "FCN-8s over VGG-16; fuses pool4 and pool3",
            builder: || FcnConfig::from_backbone(VggConfig::vgg16(), VOC_NUM_CLASSES),
            weights: Some(&VGG16_TV_WEIGHTS),
        },
        &StaticPreFabConfig {
            name: "fcn8s_vgg16_bn",
            description: "FCN-8s over VGG-16 with batch norm",
            builder: || {
                FcnConfig::from_backbone(VggConfig::vgg16().with_batch_norm(true), VOC_NUM_CLASSES)
            },
            weights: Some(&VGG16_BN_TV_WEIGHTS),
        },
        &StaticPreFabConfig {
            name: "fcn8s_resnet18",
            description: "FCN-8s over ResNet-18 at output stride 32",
            builder: || FcnConfig::from_backbone(ResNetConfig::resnet18(), VOC_NUM_CLASSES),
            weights: Some(&RESNET18_TV_WEIGHTS),
        },
        &StaticPreFabConfig {
            name: "fcn8s_resnet50",
            description: "FCN over ResNet-50 dilated to output stride 8",
            builder: || FcnConfig::resnet50(VOC_NUM_CLASSES),
            weights: Some(&RESNET50_TV_WEIGHTS),
        },
    ],
};

/// Build a prefab [`Fcn`] and load its pretrained backbone.
///
/// # Arguments
///
/// - `name`: the prefab name in [`PREFAB_FCN_MAP`].
/// - `weights`: the weights name; defaults to [`TORCHVISION_IN1K`].
/// - `num_classes`: optional class count override.
/// - `disk_cache`: the weights cache.
/// - `device`: the target device.
pub fn load_pretrained_prefab<B: Backend>(
    name: &str,
    weights: Option<&str>,
    num_classes: Option<usize>,
    disk_cache: &DiskCacheConfig,
    device: &B::Device,
) -> anyhow::Result<Fcn<B>> {
    let prefab = PREFAB_FCN_MAP.try_lookup_prefab(name)?;
    let descriptor = prefab
        .try_weights()?
        .try_lookup_by_name(weights.unwrap_or(TORCHVISION_IN1K))?;

    let mut config = prefab.new_config();
    if let Some(num_classes) = num_classes {
        config.num_classes = num_classes;
    }
    config.try_validate().map_err(anyhow::Error::msg)?;

    let path = descriptor.fetch_weights_to_disk_cache(disk_cache)?;
    tracing::info!(prefab = name, weights = %descriptor.name, "building pretrained fcn");

    config.init::<B>(device).load_pretrained_backbone(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backbone::BackboneMeta;
    use crate::models::fcn::BackboneConfig;

    #[test]
    fn test_prefabs_are_valid() {
        for name in PREFAB_FCN_MAP.names() {
            let prefab = PREFAB_FCN_MAP.expect_lookup_prefab(name);
            let config = prefab.new_config();
            config.expect_valid();
            assert_eq!(config.num_classes, VOC_NUM_CLASSES);

            let weights = prefab.try_weights().unwrap();
            let descriptor = weights.expect_lookup_by_name(TORCHVISION_IN1K);
            assert!(descriptor.urls[0].ends_with(".pth"));
        }
    }

    #[test]
    fn test_prefab_shapes() {
        let config = PREFAB_FCN_MAP
            .expect_lookup_prefab("fcn16s_vgg16")
            .new_config();
        assert_eq!(config.variant, FcnVariant::Fcn16s);
        assert_eq!(config.head.kernel_size, 7);
        assert_eq!(config.head.hidden_channels, 4096);

        let config = PREFAB_FCN_MAP
            .expect_lookup_prefab("fcn8s_resnet50")
            .new_config();
        assert_eq!(config.backbone.size_divisor(), 8);
        assert!(matches!(config.backbone, BackboneConfig::ResNet(_)));
        assert_eq!(config.head.in_channels, 2048);

        let config = PREFAB_FCN_MAP
            .expect_lookup_prefab("fcn32s_alexnet")
            .new_config();
        assert_eq!(config.head.kernel_size, 6);
        assert_eq!(config.upsample_factors(), [None, None, Some(32)]);
    }

    #[test]
    fn test_unknown_prefab() {
        let err = load_pretrained_prefab::<burn::backend::NdArray<f32>>(
            "fcn4s_vgg16",
            None,
            None,
            &DiskCacheConfig::default(),
            &Default::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("fcn8s_vgg16"));
    }
}
