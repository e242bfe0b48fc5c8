//! # FCN Backbone Dispatch
//!
//! [`BackboneConfig`] and [`Backbone`] wrap the supported feature
//! extractors behind the [`BackboneMeta`] API.

use crate::models::alexnet::{AlexNet, AlexNetConfig};
use crate::models::backbone::{BackboneMeta, FeatureTaps};
use crate::models::resnet::{ResNet, ResNetConfig};
use crate::models::vgg::{Vgg, VggConfig};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Backbone family config.
#[derive(Config, Debug)]
pub enum BackboneConfig {
    /// An [`AlexNet`] backbone.
    AlexNet(AlexNetConfig),

    /// A [`Vgg`] backbone.
    Vgg(VggConfig),

    /// A [`ResNet`] backbone.
    ResNet(ResNetConfig),
}

impl From<AlexNetConfig> for BackboneConfig {
    fn from(config: AlexNetConfig) -> Self {
        Self::AlexNet(config)
    }
}

impl From<VggConfig> for BackboneConfig {
    fn from(config: VggConfig) -> Self {
        Self::Vgg(config)
    }
}

impl From<ResNetConfig> for BackboneConfig {
    fn from(config: ResNetConfig) -> Self {
        Self::ResNet(config)
    }
}

impl BackboneMeta for BackboneConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::AlexNet(config) => config.in_channels(),
            Self::Vgg(config) => config.in_channels(),
            Self::ResNet(config) => config.in_channels(),
        }
    }

    fn tap_channels(&self) -> [usize; 3] {
        match self {
            Self::AlexNet(config) => config.tap_channels(),
            Self::Vgg(config) => config.tap_channels(),
            Self::ResNet(config) => config.tap_channels(),
        }
    }

    fn tap_strides(&self) -> [usize; 3] {
        match self {
            Self::AlexNet(config) => config.tap_strides(),
            Self::Vgg(config) => config.tap_strides(),
            Self::ResNet(config) => config.tap_strides(),
        }
    }

    fn size_divisor(&self) -> usize {
        match self {
            Self::AlexNet(config) => config.size_divisor(),
            Self::Vgg(config) => config.size_divisor(),
            Self::ResNet(config) => config.size_divisor(),
        }
    }

    fn min_input_size(&self) -> usize {
        match self {
            Self::AlexNet(config) => config.min_input_size(),
            Self::Vgg(config) => config.min_input_size(),
            Self::ResNet(config) => config.min_input_size(),
        }
    }
}

impl BackboneConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        match self {
            Self::AlexNet(_) => Ok(()),
            Self::Vgg(config) => config.try_validate(),
            Self::ResNet(config) => config.try_validate(),
        }
    }

    /// A short family name, for logs.
    pub fn family(&self) -> &'static str {
        match self {
            Self::AlexNet(_) => "alexnet",
            Self::Vgg(_) => "vgg",
            Self::ResNet(_) => "resnet",
        }
    }

    /// Initialize a [`Backbone`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Backbone<B> {
        match self {
            Self::AlexNet(config) => Backbone::AlexNet(config.init(device)),
            Self::Vgg(config) => Backbone::Vgg(config.init(device)),
            Self::ResNet(config) => Backbone::ResNet(config.init(device)),
        }
    }
}

/// FCN feature backbone.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Backbone<B: Backend> {
    /// An [`AlexNet`] backbone.
    AlexNet(AlexNet<B>),

    /// A [`Vgg`] backbone.
    Vgg(Vgg<B>),

    /// A [`ResNet`] backbone.
    ResNet(ResNet<B>),
}

impl<B: Backend> BackboneMeta for Backbone<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::AlexNet(backbone) => backbone.in_channels(),
            Self::Vgg(backbone) => backbone.in_channels(),
            Self::ResNet(backbone) => backbone.in_channels(),
        }
    }

    fn tap_channels(&self) -> [usize; 3] {
        match self {
            Self::AlexNet(backbone) => backbone.tap_channels(),
            Self::Vgg(backbone) => backbone.tap_channels(),
            Self::ResNet(backbone) => backbone.tap_channels(),
        }
    }

    fn tap_strides(&self) -> [usize; 3] {
        match self {
            Self::AlexNet(backbone) => backbone.tap_strides(),
            Self::Vgg(backbone) => backbone.tap_strides(),
            Self::ResNet(backbone) => backbone.tap_strides(),
        }
    }

    fn size_divisor(&self) -> usize {
        match self {
            Self::AlexNet(backbone) => backbone.size_divisor(),
            Self::Vgg(backbone) => backbone.size_divisor(),
            Self::ResNet(backbone) => backbone.size_divisor(),
        }
    }

    fn min_input_size(&self) -> usize {
        match self {
            Self::AlexNet(backbone) => backbone.min_input_size(),
            Self::Vgg(backbone) => backbone.min_input_size(),
            Self::ResNet(backbone) => backbone.min_input_size(),
        }
    }
}

impl<B: Backend> Backbone<B> {
    /// Recover the [`BackboneConfig`] from the module structure.
    pub fn to_config(&self) -> BackboneConfig {
        match self {
            Self::AlexNet(backbone) => backbone.to_config().into(),
            Self::Vgg(backbone) => backbone.to_config().into(),
            Self::ResNet(backbone) => backbone.to_config().into(),
        }
    }

    /// Run the backbone, collecting the ``[shallow, mid, deep]`` taps.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> FeatureTaps<B> {
        match self {
            Self::AlexNet(backbone) => backbone.forward_features(input),
            Self::Vgg(backbone) => backbone.forward_features(input),
            Self::ResNet(backbone) => backbone.forward_features(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dispatch() {
        let config: BackboneConfig = VggConfig::vgg16().into();
        assert_eq!(config.family(), "vgg");
        assert_eq!(config.tap_channels(), [256, 512, 512]);
        assert_eq!(config.size_divisor(), 32);

        let config: BackboneConfig = ResNetConfig::resnet50().with_output_stride(8).into();
        assert_eq!(config.family(), "resnet");
        assert_eq!(config.tap_strides(), [8, 8, 8]);
        assert_eq!(config.size_divisor(), 8);

        let config: BackboneConfig = AlexNetConfig::new().into();
        assert_eq!(config.tap_channels(), [64, 192, 256]);
        assert!(config.try_validate().is_ok());

        let config: BackboneConfig = ResNetConfig::resnet18().with_output_stride(2).into();
        assert!(config.try_validate().is_err());
    }
}
