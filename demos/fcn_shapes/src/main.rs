#![recursion_limit = "256"]

use burn::backend::Autodiff;
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::prelude::{Backend, Config, Module};
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::LearnerBuilder;
use burn::train::metric::{AccuracyMetric, LossMetric};
use clap::Parser;
use fcn::cache::disk::DiskCacheConfig;
use fcn::data::images::save_mask_png;
use fcn::data::shapes::SHAPE_CLASSES;
use fcn::data::{IGNORE_INDEX, SegmentationBatch, SegmentationBatcher, ShapesDatasetConfig};
use fcn::models::fcn::{Fcn, FcnConfig, FcnHeadConfig, FcnVariant};
use fcn::models::prefabs::{PREFAB_FCN_MAP, TORCHVISION_IN1K};
use fcn::models::vgg::VggConfig;
use fcn::segmentation::ConfusionMatrix;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

// $ --variant=8s --num-epochs=10 --image-size=96
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Random seed for reproducibility.
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Batch size for processing
    #[arg(short, long, default_value_t = 16)]
    batch_size: usize,

    /// Number of workers for data loading.
    #[arg(long, default_value = "2")]
    num_workers: usize,

    /// Number of epochs to train the model.
    #[arg(long, default_value = "8")]
    num_epochs: usize,

    /// Learning rate for the optimizer.
    #[arg(long, default_value = "1.0e-3")]
    learning_rate: f64,

    /// Training set size.
    #[arg(long, default_value = "512")]
    train_size: usize,

    /// Validation set size.
    #[arg(long, default_value = "64")]
    valid_size: usize,

    /// Square image size.
    #[arg(long, default_value = "64")]
    image_size: usize,

    /// Skip fusion variant: ``32s``, ``16s`` or ``8s``.
    #[arg(long, default_value = "8s")]
    variant: String,

    /// Use a prefab FCN config instead of the compact default.
    #[arg(long)]
    prefab: Option<String>,

    /// Load the prefab's pretrained backbone.
    #[arg(long)]
    pretrained: bool,

    /// Number of validation masks to write.
    #[arg(long, default_value = "4")]
    output_masks: usize,

    /// Directory to save the artifacts.
    #[arg(long, default_value = "/tmp/fcn_shapes")]
    artifact_dir: String,
}

#[derive(Config)]
pub struct TrainingConfig {
    pub model: FcnConfig,

    pub train: ShapesDatasetConfig,

    pub valid: ShapesDatasetConfig,

    #[config(default = 8)]
    pub num_epochs: usize,

    #[config(default = 16)]
    pub batch_size: usize,

    #[config(default = 2)]
    pub num_workers: usize,

    #[config(default = 0)]
    pub seed: u64,

    #[config(default = 1e-3)]
    pub learning_rate: f64,

    #[config(default = 1e-5)]
    pub weight_decay: f32,
}

fn parse_variant(name: &str) -> anyhow::Result<FcnVariant> {
    [FcnVariant::Fcn32s, FcnVariant::Fcn16s, FcnVariant::Fcn8s]
        .into_iter()
        .find(|v| v.name() == name.trim_start_matches("fcn"))
        .ok_or_else(|| anyhow::anyhow!("unknown variant {name:?}; expected 32s, 16s or 8s"))
}

/// A small VGG-style FCN that trains quickly on the CPU.
fn compact_config(
    variant: FcnVariant,
    num_classes: usize,
) -> FcnConfig {
    let backbone = VggConfig::new(vec![
        vec![16],
        vec![32],
        vec![48, 48],
        vec![64, 64],
        vec![96, 96],
    ])
    .with_batch_norm(true);
    let head = FcnHeadConfig::new(96, 192)
        .with_kernel_size(3)
        .with_padding(1)
        .with_dropout(0.2);

    FcnConfig::new(backbone.into(), head, num_classes).with_variant(variant)
}

fn build_model<B: Backend>(
    args: &Args,
    config: &FcnConfig,
    device: &B::Device,
) -> anyhow::Result<Fcn<B>> {
    let model = config.init(device);
    if !args.pretrained {
        return Ok(model);
    }

    let Some(name) = &args.prefab else {
        anyhow::bail!("--pretrained requires --prefab");
    };
    let weights = PREFAB_FCN_MAP
        .try_lookup_prefab(name)?
        .try_weights()?
        .try_lookup_by_name(TORCHVISION_IN1K)?;
    let path = weights.fetch_weights_to_disk_cache(&DiskCacheConfig::default())?;

    model.load_pretrained_backbone(path)
}

fn create_artifact_dir(artifact_dir: &str) -> anyhow::Result<()> {
    // Remove existing artifacts before to get an accurate learner summary
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(format!("{artifact_dir}/masks"))?;
    Ok(())
}

pub fn train<B: AutodiffBackend>(
    args: &Args,
    device: &B::Device,
) -> anyhow::Result<()> {
    let artifact_dir = args.artifact_dir.as_str();
    create_artifact_dir(artifact_dir)?;

    let num_classes = SHAPE_CLASSES.len();
    let variant = parse_variant(&args.variant)?;
    let model_config = match &args.prefab {
        Some(name) => {
            let mut config = PREFAB_FCN_MAP.try_lookup_prefab(name)?.new_config();
            config.num_classes = num_classes;
            config.with_variant(variant)
        }
        None => compact_config(variant, num_classes),
    };
    model_config.try_validate().map_err(anyhow::Error::msg)?;

    let shapes = |len: usize, seed: u64| {
        ShapesDatasetConfig::new(len)
            .with_height(args.image_size)
            .with_width(args.image_size)
            .with_seed(seed)
    };

    let config = TrainingConfig::new(
        model_config,
        shapes(args.train_size, args.seed),
        shapes(args.valid_size, args.seed.wrapping_add(1)),
    )
    .with_num_epochs(args.num_epochs)
    .with_batch_size(args.batch_size)
    .with_num_workers(args.num_workers)
    .with_seed(args.seed)
    .with_learning_rate(args.learning_rate);

    config.save(format!("{artifact_dir}/config.json"))?;
    tracing::info!(
        variant = config.model.variant.name(),
        backbone = config.model.backbone.family(),
        "training fcn on shapes"
    );

    B::seed(config.seed);

    // Dataloaders
    let dataloader_train = DataLoaderBuilder::<B, _, _>::new(SegmentationBatcher::imagenet())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(config.train.init());

    let dataloader_valid =
        DataLoaderBuilder::<B::InnerBackend, _, _>::new(SegmentationBatcher::imagenet())
            .batch_size(config.batch_size)
            .num_workers(config.num_workers)
            .build(config.valid.init());

    let model: Fcn<B> = build_model(args, &config.model, device)?;

    let optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay)))
        .init();

    // Learner config
    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(AccuracyMetric::new().with_pad_token(IGNORE_INDEX))
        .metric_valid_numeric(AccuracyMetric::new().with_pad_token(IGNORE_INDEX))
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_application_logger(None)
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, optimizer, config.learning_rate);

    // Training
    let now = Instant::now();
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    let elapsed = now.elapsed().as_secs();
    tracing::info!("training completed in {}m{}s", elapsed / 60, elapsed % 60);

    model_trained
        .clone()
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())?;

    evaluate(&config, model_trained.valid(), artifact_dir, args.output_masks, device)
}

/// Score the validation set and write predicted / target masks.
fn evaluate<B: Backend>(
    config: &TrainingConfig,
    model: Fcn<B>,
    artifact_dir: &str,
    output_masks: usize,
    device: &B::Device,
) -> anyhow::Result<()> {
    let dataset = config.valid.init();
    let batcher = SegmentationBatcher::imagenet();
    let mut matrix =
        ConfusionMatrix::new(model.num_classes()).with_ignore_index(Some(IGNORE_INDEX));

    let items: Vec<_> = dataset.iter().collect();
    for (chunk_index, chunk) in items.chunks(config.batch_size).enumerate() {
        let batch: SegmentationBatch<B> = batcher.batch(chunk.to_vec(), device);
        let predictions = model.predict(batch.images.clone());
        matrix.update(predictions.clone(), batch.masks);

        let labels: Vec<usize> = predictions
            .into_data()
            .iter::<i64>()
            .map(|v| v as usize)
            .collect();
        for (i, item) in chunk.iter().enumerate() {
            let index = chunk_index * config.batch_size + i;
            if index >= output_masks {
                break;
            }
            let pixels = item.height * item.width;
            let predicted = &labels[i * pixels..(i + 1) * pixels];
            save_mask_png(
                predicted,
                item.height,
                item.width,
                format!("{artifact_dir}/masks/{index:03}_pred.png"),
            )?;
            save_mask_png(
                &item.mask,
                item.height,
                item.width,
                format!("{artifact_dir}/masks/{index:03}_true.png"),
            )?;
        }
    }

    for (class, iou) in SHAPE_CLASSES.iter().zip(matrix.class_iou()) {
        tracing::info!(class, iou = iou.unwrap_or(f64::NAN), "class iou");
    }
    tracing::info!(
        pixel_accuracy = matrix.pixel_accuracy(),
        mean_accuracy = matrix.mean_accuracy(),
        mean_iou = matrix.mean_iou(),
        frequency_weighted_iou = matrix.frequency_weighted_iou(),
        "validation"
    );

    std::fs::write(
        format!("{artifact_dir}/confusion.json"),
        serde_json::to_string_pretty(&matrix)?,
    )?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    #[cfg(feature = "wgpu")]
    {
        wgpu::run(&args)
    }
    #[cfg(not(feature = "wgpu"))]
    {
        ndarray::run(&args)
    }
}

#[cfg(not(feature = "wgpu"))]
mod ndarray {
    use super::*;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    pub fn run(args: &Args) -> anyhow::Result<()> {
        train::<Autodiff<NdArray<f32>>>(args, &NdArrayDevice::default())
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use super::*;
    use burn::backend::wgpu::{Wgpu, WgpuDevice};

    pub fn run(args: &Args) -> anyhow::Result<()> {
        train::<Autodiff<Wgpu>>(args, &WgpuDevice::default())
    }
}
