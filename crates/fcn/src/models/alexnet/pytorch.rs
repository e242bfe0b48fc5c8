//! # torchvision `AlexNet` weights.
//!
//! torchvision layout:
//!
//! ```text
//! features.{0, 3, 6, 8, 10}  Conv2d
//! classifier.{1, 4}          Linear (fc6, fc7)
//! classifier.6               Linear (ImageNet logits; dropped)
//! ```

use crate::io::pytorch::{KeyRemap, copy_conv_act_weights, indexed_key_remaps, load_pytorch_record};
use crate::models::alexnet::AlexNet;
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::{Linear, LinearRecord};
use burn::prelude::Backend;
use std::path::PathBuf;

/// torchvision ``features`` indices of the `AlexNet` convs.
pub const ALEXNET_TORCH_CONV_INDICES: [usize; 5] = [0, 3, 6, 8, 10];

/// torchvision ``classifier`` indices of ``fc6`` and ``fc7``.
pub const ALEXNET_TORCH_FC_INDICES: [usize; 2] = [1, 4];

/// Stub mirroring the parameterized torchvision `AlexNet` layers.
#[derive(Module, Debug)]
pub struct AlexNetStub<B: Backend> {
    /// Feature convs.
    pub convs: Vec<Conv2d<B>>,

    /// ``fc6``, ``fc7``.
    pub linears: Vec<Linear<B>>,
}

/// Key remaps from torchvision names to [`AlexNetStub`] names.
pub fn alexnet_key_remaps() -> Vec<KeyRemap> {
    let mut remaps = indexed_key_remaps("features", &ALEXNET_TORCH_CONV_INDICES, "convs");
    remaps.extend(indexed_key_remaps(
        "classifier",
        &ALEXNET_TORCH_FC_INDICES,
        "linears",
    ));
    remaps
}

impl<B: Backend> AlexNetStubRecord<B> {
    /// Copy the conv weights onto an [`AlexNet`].
    ///
    /// # Returns
    ///
    /// ``(backbone, [fc6, fc7])``
    pub fn copy_weights(
        self,
        target: AlexNet<B>,
    ) -> (AlexNet<B>, Vec<LinearRecord<B>>) {
        assert_eq!(
            self.convs.len(),
            target.convs.len(),
            "AlexNet conv count mismatch"
        );
        let backbone = AlexNet {
            convs: self
                .convs
                .into_iter()
                .zip(target.convs)
                .map(|(conv, block)| copy_conv_act_weights(conv, None, block))
                .collect(),
            ..target
        };
        (backbone, self.linears)
    }
}

/// Load torchvision `AlexNet` weights onto an [`AlexNet`] backbone.
///
/// # Returns
///
/// ``(backbone, [fc6, fc7])``; the classifier records can be
/// convolutionalized into an FCN head.
pub fn load_alexnet_pytorch_weights<B: Backend>(
    target: AlexNet<B>,
    path: PathBuf,
) -> anyhow::Result<(AlexNet<B>, Vec<LinearRecord<B>>)> {
    let device = &target.devices()[0];
    let record: AlexNetStubRecord<B> =
        load_pytorch_record(path, &alexnet_key_remaps(), device)?;
    Ok(record.copy_weights(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alexnet::AlexNetConfig;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;

    #[test]
    fn test_key_remaps() {
        let remaps = alexnet_key_remaps();
        assert_eq!(remaps.len(), 7);
        assert_eq!(remaps[1], (r"^features\.3\.".to_string(), "convs.1.".to_string()));
        assert_eq!(
            remaps[6],
            (r"^classifier\.4\.".to_string(), "linears.1.".to_string())
        );
    }

    #[test]
    fn test_copy_weights() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = AlexNetConfig::new().with_channels([4, 6, 6, 6, 4]);
        let stub = AlexNetStub::<B> {
            convs: config
                .conv_configs()
                .into_iter()
                .map(|c| c.conv.init(&device))
                .collect(),
            linears: vec![LinearConfig::new(4 * 6 * 6, 8).init(&device)],
        };
        let expected = stub.convs[2].weight.val();

        let (backbone, linears) = stub.into_record().copy_weights(config.init::<B>(&device));

        assert_eq!(linears.len(), 1);
        backbone.convs[2]
            .conv
            .weight
            .val()
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }
}
