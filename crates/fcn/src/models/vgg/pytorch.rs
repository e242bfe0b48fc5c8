//! # torchvision `VGG` weights.
//!
//! torchvision flattens the feature stack into one ``features`` sequence:
//! ``conv, [bn], relu`` per conv and one ``maxpool`` per stage; so the
//! parameter indices depend on the stage layout and on batch norm.
//!
//! ``classifier.{0, 3}`` are ``fc6`` / ``fc7``; ``classifier.6`` (ImageNet
//! logits) is dropped.

use crate::io::pytorch::{KeyRemap, copy_conv_act_weights, indexed_key_remaps, load_pytorch_record};
use crate::models::vgg::{Vgg, VggConfig, VggStage};
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear, LinearRecord};
use burn::prelude::Backend;
use std::path::PathBuf;

/// torchvision ``classifier`` indices of ``fc6`` and ``fc7``.
pub const VGG_TORCH_FC_INDICES: [usize; 2] = [0, 3];

/// Stub mirroring the parameterized torchvision `VGG` layers.
#[derive(Module, Debug)]
pub struct VggStub<B: Backend> {
    /// Feature convs, flattened over stages.
    pub convs: Vec<Conv2d<B>>,

    /// Feature norms, flattened over stages; `VGG-BN` only.
    pub norms: Option<Vec<BatchNorm<B, 2>>>,

    /// ``fc6``, ``fc7``.
    pub linears: Vec<Linear<B>>,
}

/// The torchvision ``features`` indices of the convs and norms.
///
/// # Returns
///
/// ``(conv_indices, norm_indices)``; norm indices are empty without batch norm.
pub fn vgg_torch_feature_indices(config: &VggConfig) -> (Vec<usize>, Vec<usize>) {
    let mut convs = Vec::new();
    let mut norms = Vec::new();
    let mut cursor = 0;

    for stage in &config.stages {
        for _ in stage {
            convs.push(cursor);
            cursor += 1;
            if config.batch_norm {
                norms.push(cursor);
                cursor += 1;
            }
            // relu
            cursor += 1;
        }
        // maxpool
        cursor += 1;
    }
    (convs, norms)
}

/// Key remaps from torchvision names to [`VggStub`] names.
pub fn vgg_key_remaps(config: &VggConfig) -> Vec<KeyRemap> {
    let (conv_indices, norm_indices) = vgg_torch_feature_indices(config);

    let mut remaps = indexed_key_remaps("features", &conv_indices, "convs");
    remaps.extend(indexed_key_remaps("features", &norm_indices, "norms"));
    remaps.extend(indexed_key_remaps(
        "classifier",
        &VGG_TORCH_FC_INDICES,
        "linears",
    ));
    remaps
}

impl<B: Backend> VggStubRecord<B> {
    /// Copy the feature weights onto a [`Vgg`].
    ///
    /// # Returns
    ///
    /// ``(backbone, [fc6, fc7])``
    pub fn copy_weights(
        self,
        target: Vgg<B>,
    ) -> (Vgg<B>, Vec<LinearRecord<B>>) {
        let total: usize = target.stages.iter().map(|s| s.convs.len()).sum();
        assert_eq!(self.convs.len(), total, "VGG conv count mismatch");

        let mut convs = self.convs.into_iter();
        let mut norms = self.norms.map(|norms| norms.into_iter());

        let stages = target
            .stages
            .into_iter()
            .map(|stage| VggStage {
                convs: stage
                    .convs
                    .into_iter()
                    .map(|block| {
                        let Some(conv) = convs.next() else {
                            unreachable!("conv count checked above");
                        };
                        let norm = norms.as_mut().and_then(|it| it.next());
                        copy_conv_act_weights(conv, norm, block)
                    })
                    .collect(),
            })
            .collect();

        (
            Vgg {
                stages,
                ..target
            },
            self.linears,
        )
    }
}

/// Load torchvision `VGG` weights onto a [`Vgg`] backbone.
///
/// # Returns
///
/// ``(backbone, [fc6, fc7])``; the classifier records can be
/// convolutionalized into an FCN head.
pub fn load_vgg_pytorch_weights<B: Backend>(
    target: Vgg<B>,
    path: PathBuf,
) -> anyhow::Result<(Vgg<B>, Vec<LinearRecord<B>>)> {
    let device = &target.devices()[0];
    let remaps = vgg_key_remaps(&target.to_config());
    let record: VggStubRecord<B> = load_pytorch_record(path, &remaps, device)?;
    Ok(record.copy_weights(target))
}
