use anyhow::Result;
use burn::{
    config::Config,
    data::dataloader::DataLoader,
    module::{AutodiffModule, Module},
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        cast::ToElement,
        Distribution, Int, Tensor,
    },
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::info;

use crate::{
    checkpoint::CheckpointManager,
    data::FaceBatch,
    model::{discriminator::Discriminator, generator::Generator, ModelConfig},
    preview::PreviewRenderer,
    utils::fmt_duration,
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub gen_optimizer: AdamConfig,
    pub disc_optimizer: AdamConfig,
    pub outdir: String,

    #[config(default = 1000)]
    pub epochs: usize,
    #[config(default = 35)]
    pub batch_size: usize,
    /// Checkpoint every N epochs (a checkpoint is always written at the
    /// final epoch).
    #[config(default = 50)]
    pub save_every: usize,
    #[config(default = 3)]
    pub max_checkpoints: usize,
    #[config(default = 1e-4)]
    pub gen_lr: f64,
    #[config(default = 1e-4)]
    pub disc_lr: f64,
    #[config(default = 4)]
    pub preview_rows: usize,
    #[config(default = 7)]
    pub preview_cols: usize,
    #[config(default = 16)]
    pub preview_margin: usize,
    #[config(default = 42)]
    pub seed: u64,
}

/// Mutable state of one training run, persisted inside every checkpoint.
/// The epoch field holds the next epoch to run, so a restored run picks up
/// exactly where the checkpointed one stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSession {
    pub epoch: usize,
    pub gen_loss: Vec<f32>,
    pub disc_loss: Vec<f32>,
}

impl Default for TrainSession {
    fn default() -> Self {
        Self {
            epoch: 1,
            gen_loss: Vec::new(),
            disc_loss: Vec::new(),
        }
    }
}

/// BCE(real, ones) + BCE(fake, zeros): penalizes misclassifying either side.
pub fn discriminator_loss<B: Backend>(
    bce: &BinaryCrossEntropyLoss<B>,
    real_scores: Tensor<B, 2>,
    fake_scores: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let device = real_scores.device();
    let [real_size, _] = real_scores.dims();
    let [fake_size, _] = fake_scores.dims();

    let real_targets = Tensor::<B, 1, Int>::ones([real_size], &device);
    let fake_targets = Tensor::<B, 1, Int>::zeros([fake_size], &device);

    let real_loss = bce.forward(real_scores.squeeze(1), real_targets);
    let fake_loss = bce.forward(fake_scores.squeeze(1), fake_targets);

    real_loss + fake_loss
}

/// BCE(fake, ones): rewards the generator when the discriminator is fooled.
pub fn generator_loss<B: Backend>(
    bce: &BinaryCrossEntropyLoss<B>,
    fake_scores: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let device = fake_scores.device();
    let [fake_size, _] = fake_scores.dims();
    let targets = Tensor::<B, 1, Int>::ones([fake_size], &device);

    bce.forward(fake_scores.squeeze(1), targets)
}

/// One adversarial update: both losses come from a single synthetic batch,
/// both gradients are computed before either network moves, and each
/// optimizer only ever sees its own network's gradients.
#[allow(clippy::too_many_arguments)]
pub fn train_step<B, OG, OD>(
    batch: &FaceBatch<B>,
    generator: Generator<B>,
    discriminator: Discriminator<B>,
    optim_gen: &mut OG,
    optim_disc: &mut OD,
    bce: &BinaryCrossEntropyLoss<B>,
    config: &TrainingConfig,
    device: &B::Device,
) -> (Generator<B>, Discriminator<B>, f32, f32)
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    let noise = Tensor::<B, 2>::random(
        [batch.size, config.model.generator.latent_dim],
        Distribution::Normal(0.0, 1.0),
        device,
    );
    let fake_images = generator.forward(noise);

    // The discriminator grades the same synthetic batch, detached so no
    // gradient reaches the generator from its loss.
    let real_scores = discriminator.forward(batch.images.clone());
    let fake_scores_detached = discriminator.forward(fake_images.clone().detach());
    let disc_loss = discriminator_loss(bce, real_scores, fake_scores_detached);

    let fake_scores = discriminator.forward(fake_images);
    let gen_loss = generator_loss(bce, fake_scores);

    let g_loss = gen_loss.clone().into_scalar().to_f32();
    let d_loss = disc_loss.clone().into_scalar().to_f32();

    let disc_grads = GradientsParams::from_grads(disc_loss.backward(), &discriminator);
    let gen_grads = GradientsParams::from_grads(gen_loss.backward(), &generator);

    let discriminator = optim_disc.step(config.disc_lr, discriminator, disc_grads);
    let generator = optim_gen.step(config.gen_lr, generator, gen_grads);

    (generator, discriminator, g_loss, d_loss)
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    dataloader: Arc<dyn DataLoader<B, FaceBatch<B>>>,
    device: &B::Device,
) -> Result<()> {
    std::fs::create_dir_all(&config.outdir)?;
    config.save(format!("{}/config.json", config.outdir))?;

    B::seed(config.seed);

    let (generator, discriminator) = config.model.init::<B>(device);
    let optim_gen = config.gen_optimizer.init();
    let optim_disc = config.disc_optimizer.init();

    // The fixed seed batch is drawn once, right after seeding, so every run
    // previews the same latent points.
    let fixed_noise = Tensor::<B::InnerBackend, 2>::random(
        [
            config.preview_rows * config.preview_cols,
            config.model.generator.latent_dim,
        ],
        Distribution::Normal(0.0, 1.0),
        device,
    );

    let checkpoints = CheckpointManager::new(
        format!("{}/checkpoints", config.outdir),
        config.max_checkpoints,
    );
    let previews = PreviewRenderer::new(
        format!("{}/previews", config.outdir),
        config.preview_rows,
        config.preview_cols,
        config.preview_margin,
    );

    let restored = checkpoints.restore(generator, discriminator, optim_gen, optim_disc, device)?;
    let mut generator = restored.generator;
    let mut discriminator = restored.discriminator;
    let mut optim_gen = restored.optim_gen;
    let mut optim_disc = restored.optim_disc;
    let mut session = match restored.session {
        Some(session) => {
            info!(epoch = session.epoch, "restored latest checkpoint");
            session
        }
        None => {
            info!("initializing from scratch");
            TrainSession::default()
        }
    };

    let bce = BinaryCrossEntropyLossConfig::new().init::<B>(device);
    let start = Instant::now();

    for epoch in session.epoch..=config.epochs {
        let epoch_start = Instant::now();
        let mut gen_losses = Vec::new();
        let mut disc_losses = Vec::new();

        for batch in dataloader.iter() {
            let (gen, disc, g_loss, d_loss) = train_step(
                &batch,
                generator,
                discriminator,
                &mut optim_gen,
                &mut optim_disc,
                &bce,
                config,
                device,
            );
            generator = gen;
            discriminator = disc;
            gen_losses.push(g_loss);
            disc_losses.push(d_loss);
        }

        // Plain mean over batches; a final partial batch weighs as much as
        // a full one.
        let g_loss = mean(&gen_losses);
        let d_loss = mean(&disc_losses);
        session.gen_loss.push(g_loss);
        session.disc_loss.push(d_loss);
        session.epoch = epoch + 1;

        previews.render(&generator.valid(), fixed_noise.clone(), epoch)?;

        if epoch % config.save_every == 0 || epoch == config.epochs {
            let path = checkpoints.save(
                &generator,
                &discriminator,
                &optim_gen,
                &optim_disc,
                &session,
            )?;
            info!(epoch, path = %path.display(), "saved checkpoint");
        }

        info!(
            epoch,
            gen_loss = g_loss,
            disc_loss = d_loss,
            elapsed = %fmt_duration(epoch_start.elapsed()),
            "epoch complete"
        );
    }

    info!(elapsed = %fmt_duration(start.elapsed()), "training complete");

    // Final weights, separate from the rolling checkpoints.
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder.record(
        generator.into_record(),
        format!("{}/face_generator", config.outdir).into(),
    )?;
    recorder.record(
        discriminator.into_record(),
        format!("{}/face_discriminator", config.outdir).into(),
    )?;

    Ok(())
}
