#![recursion_limit = "256"]

mod animation;
mod checkpoint;
mod data;
mod model;
mod preview;
mod training;
mod utils;

use anyhow::Result;
use burn::{
    backend::{Autodiff, Wgpu},
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    grad_clipping::GradientClippingConfig,
    optim::AdamConfig,
};
use tracing::info;

use data::{FaceBatcher, FaceDataset};
use model::{discriminator::DiscriminatorConfig, generator::GeneratorConfig, ModelConfig};
use training::{train, TrainingConfig};

const IMAGES_PATH: &str = "data/faces";
const OUTDIR: &str = "output";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    type MyBackend = Wgpu<f32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    let device = burn::backend::wgpu::WgpuDevice::default();

    let generator = GeneratorConfig::new();
    let discriminator = DiscriminatorConfig::new(generator.image_res());
    let adam = AdamConfig::new()
        .with_beta_1(0.5)
        .with_grad_clipping(Some(GradientClippingConfig::Value(1.0)));
    let config = TrainingConfig::new(
        ModelConfig::new(generator, discriminator),
        adam.clone(),
        adam,
        OUTDIR.to_string(),
    );

    let resolution = config.model.generator.image_res();
    info!(resolution, path = IMAGES_PATH, "loading face images");
    let dataset = FaceDataset::<MyAutodiffBackend>::new(IMAGES_PATH, resolution, &device)?;
    info!(images = dataset.len(), "dataset ready");

    let dataloader = DataLoaderBuilder::new(FaceBatcher)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .build(dataset);

    train::<MyAutodiffBackend>(&config, dataloader, &device)?;

    let frames = animation::export_animation(
        format!("{OUTDIR}/previews"),
        format!("{OUTDIR}/faces.gif"),
    )?;
    info!(frames, "wrote progress animation");

    Ok(())
}
