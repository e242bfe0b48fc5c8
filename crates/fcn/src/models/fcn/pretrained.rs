//! # Pretrained FCN Backbones
//!
//! Loads torchvision ImageNet weights into an [`Fcn`] backbone. For the
//! `AlexNet` and `VGG` families, the ``fc6`` / ``fc7`` classifier weights
//! are also convolutionalized into the head when the head matches the
//! classifier geometry.

use crate::layers::blocks::conv_act::ConvAct2d;
use crate::layers::convolutionalize::linear_weights_into_conv2d;
use crate::models::alexnet::pytorch::load_alexnet_pytorch_weights;
use crate::models::fcn::backbone::Backbone;
use crate::models::fcn::fcn_model::Fcn;
use crate::models::fcn::head::FcnHead;
use crate::models::resnet::pytorch::load_resnet_pytorch_weights;
use crate::models::vgg::pytorch::load_vgg_pytorch_weights;
use burn::nn::LinearRecord;
use burn::prelude::Backend;
use std::path::PathBuf;

/// Convolutionalize one classifier layer into a head block.
fn load_classifier_layer<B: Backend>(
    linear: LinearRecord<B>,
    block: ConvAct2d<B>,
) -> anyhow::Result<ConvAct2d<B>> {
    let conv = linear_weights_into_conv2d(
        linear.weight.val(),
        linear.bias.map(|b| b.val()),
        block.conv,
    )?;
    Ok(ConvAct2d { conv, ..block })
}

/// Convolutionalize ``[fc6, fc7]`` classifier records into a head.
///
/// On any geometry mismatch the head is returned unchanged, with a warning.
pub fn load_classifier_into_head<B: Backend>(
    linears: Vec<LinearRecord<B>>,
    head: FcnHead<B>,
) -> FcnHead<B> {
    let mut linears = linears.into_iter();
    let (Some(fc6), Some(fc7)) = (linears.next(), linears.next()) else {
        tracing::warn!("classifier weights missing; keeping fresh head");
        return head;
    };
    let Some(fc7_block) = head.fc7.clone() else {
        tracing::warn!("head has no fc7; keeping fresh head");
        return head;
    };

    let loaded = load_classifier_layer(fc6, head.fc6.clone()).and_then(|fc6| {
        let fc7 = load_classifier_layer(fc7, fc7_block)?;
        Ok(FcnHead {
            fc6,
            fc7: Some(fc7),
        })
    });

    match loaded {
        Ok(head) => {
            tracing::info!("convolutionalized fc6/fc7 into the head");
            head
        }
        Err(err) => {
            tracing::warn!(%err, "classifier does not fit the head; keeping fresh head");
            head
        }
    }
}

impl<B: Backend> Fcn<B> {
    /// Load torchvision ImageNet weights into the backbone.
    ///
    /// # Arguments
    ///
    /// - `path`: a torchvision ``.pth`` file for the backbone family.
    pub fn load_pretrained_backbone(
        self,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        tracing::info!(path = %path.display(), "loading pretrained backbone");

        let (backbone, head) = match self.backbone {
            Backbone::AlexNet(backbone) => {
                let (backbone, linears) = load_alexnet_pytorch_weights(backbone, path)?;
                (
                    Backbone::AlexNet(backbone),
                    load_classifier_into_head(linears, self.head),
                )
            }
            Backbone::Vgg(backbone) => {
                let (backbone, linears) = load_vgg_pytorch_weights(backbone, path)?;
                (
                    Backbone::Vgg(backbone),
                    load_classifier_into_head(linears, self.head),
                )
            }
            Backbone::ResNet(backbone) => (
                Backbone::ResNet(load_resnet_pytorch_weights(backbone, path)?),
                self.head,
            ),
        };

        Ok(Fcn {
            backbone,
            head,
            ..self
        })
    }
}
