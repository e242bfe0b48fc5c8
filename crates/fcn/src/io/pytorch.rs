//! # ``torch`` Weight Loading
//!
//! Pretrained backbones are published as torchvision ``.pth`` files.
//! Each model family declares a stub module mirroring the torchvision
//! parameter tree (only the parameterized layers), plus a list of key
//! remaps from torchvision names into the stub's names. The stub record
//! is then copied onto the real module.

use crate::layers::blocks::conv_act::ConvAct2d;
use crate::layers::blocks::conv_norm::ConvNorm2d;
use burn::module::Module;
use burn::nn::BatchNormRecord;
use burn::nn::conv::Conv2dRecord;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Record, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// A ``(regex pattern, replacement)`` key remap.
pub type KeyRemap = (String, String);

/// Load a stub record from a ``torch`` weights file.
///
/// # Arguments
///
/// - `path`: the ``.pth`` file.
/// - `remaps`: key remaps, applied in order.
/// - `device`: the target device.
pub fn load_pytorch_record<B: Backend, R: Record<B>>(
    path: PathBuf,
    remaps: &[KeyRemap],
    device: &B::Device,
) -> anyhow::Result<R> {
    tracing::debug!(path = %path.display(), remaps = remaps.len(), "loading torch weights");

    let load_args = remaps
        .iter()
        .fold(LoadArgs::new(path), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;
    Ok(record)
}

/// Remap a dense list of torch module indices under `source` onto `target.{k}`.
///
/// ``features.5.weight`` with ``indices[2] == 5`` becomes ``convs.2.weight``.
/// The target prefix must differ from the source prefix so remaps do not chain.
pub fn indexed_key_remaps(
    source: &str,
    indices: &[usize],
    target: &str,
) -> Vec<KeyRemap> {
    assert_ne!(source, target, "remap prefixes must differ");
    indices
        .iter()
        .enumerate()
        .map(|(k, idx)| {
            (
                format!(r"^{}\.{}\.", regex_escape(source), idx),
                format!("{target}.{k}."),
            )
        })
        .collect()
}

fn regex_escape(s: &str) -> String {
    s.replace('.', r"\.")
}

/// Copy ``conv`` weights onto a [`ConvAct2d`].
pub fn copy_conv_act_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    norm: Option<BatchNormRecord<B, 2>>,
    target: ConvAct2d<B>,
) -> ConvAct2d<B> {
    let norm = match (norm, target.norm) {
        (Some(record), Some(layer)) => Some(layer.load_record(record)),
        (None, layer) => layer,
        (Some(_), None) => panic!("norm weights cannot be applied to a block without a norm"),
    };
    ConvAct2d {
        conv: target.conv.load_record(conv),
        norm,
        ..target
    }
}

/// Copy ``conv`` / ``bn`` weights onto a [`ConvNorm2d`].
pub fn copy_conv_norm_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: ConvNorm2d<B>,
) -> ConvNorm2d<B> {
    ConvNorm2d {
        conv: target.conv.load_record(conv),
        norm: target.norm.load_record(bn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_key_remaps() {
        let remaps = indexed_key_remaps("features", &[0, 2, 5], "convs");
        assert_eq!(
            remaps,
            vec![
                (r"^features\.0\.".to_string(), "convs.0.".to_string()),
                (r"^features\.2\.".to_string(), "convs.1.".to_string()),
                (r"^features\.5\.".to_string(), "convs.2.".to_string()),
            ]
        );

        let remaps = indexed_key_remaps("model.classifier", &[1], "linears");
        assert_eq!(remaps[0].0, r"^model\.classifier\.1\.");
    }

    #[test]
    #[should_panic(expected = "remap prefixes must differ")]
    fn test_indexed_key_remaps_chain() {
        indexed_key_remaps("features", &[0], "features");
    }
}
