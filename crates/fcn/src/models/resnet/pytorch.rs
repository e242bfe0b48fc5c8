#![allow(missing_docs)]
//! # torchvision `ResNet` weights.
//!
//! Stub modules mirroring the torchvision parameter tree; stateless modules
//! (``relu``, ``maxpool``) cannot be recovered from the weights, so the stub
//! record is copied onto a [`ResNet`] built from its config.
//!
//! The classifier (``fc``) is not part of the stub and is ignored.

use crate::io::pytorch::{KeyRemap, copy_conv_norm_weights, load_pytorch_record};
use crate::models::resnet::basic_block::BasicBlock;
use crate::models::resnet::bottleneck::BottleneckBlock;
use crate::models::resnet::downsample::ResNetDownsample;
use crate::models::resnet::layer_block::LayerBlock;
use crate::models::resnet::residual_block::ResidualBlock;
use crate::models::resnet::resnet_model::ResNet;
use burn::module::Module;
use burn::nn::BatchNorm;
use burn::nn::conv::Conv2d;
use burn::prelude::Backend;
use std::path::PathBuf;

/// Key remaps from torchvision names to [`ResNetStub`] names.
pub fn resnet_key_remaps() -> Vec<KeyRemap> {
    let mut remaps: Vec<KeyRemap> = (1..=4)
        .map(|idx| (format!(r"^layer{idx}\."), format!("layers.{}.blocks.", idx - 1)))
        .collect();
    remaps.push((r"downsample\.0\.".to_string(), "downsample.conv.".to_string()));
    remaps.push((r"downsample\.1\.".to_string(), "downsample.bn.".to_string()));
    remaps
}

/// Load weights from a ``torch`` weights path onto a [`ResNet`] backbone.
pub fn load_resnet_pytorch_weights<B: Backend>(
    resnet: ResNet<B>,
    path: PathBuf,
) -> anyhow::Result<ResNet<B>> {
    let device = &resnet.devices()[0];
    let record: ResNetStubRecord<B> = load_pytorch_record(path, &resnet_key_remaps(), device)?;
    Ok(record.copy_weights(resnet))
}

/// torchvision `ResNet` trunk stub.
#[derive(Module, Debug)]
pub struct ResNetStub<B: Backend> {
    /// Stem conv.
    pub conv1: Conv2d<B>,
    /// Stem norm.
    pub bn1: BatchNorm<B, 2>,
    /// ``layer1`` .. ``layer4``.
    pub layers: Vec<LayerBlockStub<B>>,
}

impl<B: Backend> ResNetStubRecord<B> {
    /// Copy the stub weights onto a [`ResNet`].
    pub fn copy_weights(
        self,
        target: ResNet<B>,
    ) -> ResNet<B> {
        assert_eq!(
            self.layers.len(),
            target.layers.len(),
            "ResNet layer count mismatch"
        );
        ResNet {
            input_conv_norm: copy_conv_norm_weights(self.conv1, self.bn1, target.input_conv_norm),
            layers: self
                .layers
                .into_iter()
                .zip(target.layers)
                .map(|(s, t)| s.copy_weights(t))
                .collect(),
            ..target
        }
    }
}

/// torchvision ``layerN`` stub.
#[derive(Module, Debug)]
pub struct LayerBlockStub<B: Backend> {
    /// The residual blocks.
    pub blocks: Vec<ResidualBlockStub<B>>,
}

impl<B: Backend> LayerBlockStubRecord<B> {
    /// Copy the stub weights onto a [`LayerBlock`].
    pub fn copy_weights(
        self,
        target: LayerBlock<B>,
    ) -> LayerBlock<B> {
        assert_eq!(
            self.blocks.len(),
            target.blocks.len(),
            "ResNet block count mismatch"
        );
        LayerBlock {
            blocks: self
                .blocks
                .into_iter()
                .zip(target.blocks)
                .map(|(s, t)| s.copy_weights(t))
                .collect(),
        }
    }
}

/// torchvision ``BasicBlock`` / ``Bottleneck`` stub.
///
/// ``conv3`` / ``bn3`` are present only in bottleneck blocks.
#[derive(Module, Debug)]
pub struct ResidualBlockStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Option<Conv2d<B>>,
    pub bn3: Option<BatchNorm<B, 2>>,
    pub downsample: Option<DownsampleStub<B>>,
}

impl<B: Backend> ResidualBlockStubRecord<B> {
    /// Copy the stub weights onto a [`ResidualBlock`].
    ///
    /// # Panics
    ///
    /// If the stub and target block kinds, or their shortcuts, disagree.
    pub fn copy_weights(
        self,
        target: ResidualBlock<B>,
    ) -> ResidualBlock<B> {
        match (self.conv3, self.bn3, target) {
            (None, None, ResidualBlock::Basic(block)) => ResidualBlock::Basic(BasicBlock {
                conv_norm1: copy_conv_norm_weights(self.conv1, self.bn1, block.conv_norm1),
                conv_norm2: copy_conv_norm_weights(self.conv2, self.bn2, block.conv_norm2),
                downsample: copy_downsample_weights(self.downsample, block.downsample),
                ..block
            }),
            (Some(conv3), Some(bn3), ResidualBlock::Bottleneck(block)) => {
                ResidualBlock::Bottleneck(BottleneckBlock {
                    conv_norm1: copy_conv_norm_weights(self.conv1, self.bn1, block.conv_norm1),
                    conv_norm2: copy_conv_norm_weights(self.conv2, self.bn2, block.conv_norm2),
                    conv_norm3: copy_conv_norm_weights(conv3, bn3, block.conv_norm3),
                    downsample: copy_downsample_weights(self.downsample, block.downsample),
                    ..block
                })
            }
            (_, _, ResidualBlock::Basic(_)) => {
                panic!("Cannot apply bottleneck block stub to basic block")
            }
            (_, _, ResidualBlock::Bottleneck(_)) => {
                panic!("Cannot apply basic block stub to bottleneck block")
            }
        }
    }
}

/// torchvision ``downsample`` stub; ``Sequential(conv, bn)``.
#[derive(Module, Debug)]
pub struct DownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

/// Copy an optional shortcut projection.
///
/// # Panics
///
/// If exactly one of the stub and the target has a projection.
pub fn copy_downsample_weights<B: Backend>(
    downsample: Option<DownsampleStubRecord<B>>,
    target: Option<ResNetDownsample<B>>,
) -> Option<ResNetDownsample<B>> {
    match (downsample, target) {
        (Some(stub), Some(target)) => Some(ResNetDownsample {
            conv_norm: copy_conv_norm_weights(stub.conv, stub.bn, target.conv_norm),
        }),
        (None, None) => None,
        (None, Some(_)) => panic!("None stub cannot be applied to Some<Downsample>"),
        (Some(_), None) => panic!("Some<Downsample> stub cannot be applied to None"),
    }
}
