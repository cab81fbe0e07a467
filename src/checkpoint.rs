use anyhow::{Context, Result};
use burn::{
    module::Module,
    optim::Optimizer,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::model::{discriminator::Discriminator, generator::Generator};
use crate::training::TrainSession;

const CKPT_PREFIX: &str = "ckpt-";

/// Everything a resumed run needs back from the latest checkpoint. When no
/// checkpoint exists the inputs are handed back untouched and `session` is
/// `None` (cold start).
pub struct Restored<B, OG, OD>
where
    B: AutodiffBackend,
{
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    pub optim_gen: OG,
    pub optim_disc: OD,
    pub session: Option<TrainSession>,
}

/// Numbered weight/optimizer snapshots with bounded retention. Each record
/// carries the session state, so the resumed epoch comes from the record
/// itself rather than being reconstructed from the save interval.
pub struct CheckpointManager {
    dir: PathBuf,
    max_to_keep: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, max_to_keep: usize) -> Self {
        Self {
            dir: dir.into(),
            max_to_keep,
        }
    }

    /// Ordinals of the retained records, ascending. A missing checkpoint
    /// directory means no records.
    fn ordinals(&self) -> Result<Vec<u64>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).context("failed to list checkpoint directory"),
        };

        let mut ordinals = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(ordinal) = name.strip_prefix(CKPT_PREFIX) {
                    if let Ok(ordinal) = ordinal.parse::<u64>() {
                        ordinals.push(ordinal);
                    }
                }
            }
        }
        ordinals.sort_unstable();
        Ok(ordinals)
    }

    fn record_dir(&self, ordinal: u64) -> PathBuf {
        self.dir.join(format!("{CKPT_PREFIX}{ordinal}"))
    }

    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .ordinals()?
            .last()
            .map(|&ordinal| self.record_dir(ordinal)))
    }

    /// Write a new numbered record and drop the oldest ones beyond the
    /// retention bound.
    pub fn save<B, OG, OD>(
        &self,
        generator: &Generator<B>,
        discriminator: &Discriminator<B>,
        optim_gen: &OG,
        optim_disc: &OD,
        session: &TrainSession,
    ) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        OG: Optimizer<Generator<B>, B>,
        OD: Optimizer<Discriminator<B>, B>,
    {
        let next = self.ordinals()?.last().map_or(1, |last| last + 1);
        let dir = self.record_dir(next);
        std::fs::create_dir_all(&dir)?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder.record(generator.clone().into_record(), dir.join("generator"))?;
        recorder.record(
            discriminator.clone().into_record(),
            dir.join("discriminator"),
        )?;
        recorder.record(optim_gen.to_record(), dir.join("optim_gen"))?;
        recorder.record(optim_disc.to_record(), dir.join("optim_disc"))?;

        let state = serde_json::to_string_pretty(session)?;
        std::fs::write(dir.join("state.json"), state)?;

        self.prune()?;
        Ok(dir)
    }

    /// Load weights, optimizer state, and session from the most recent
    /// record, if any.
    pub fn restore<B, OG, OD>(
        &self,
        generator: Generator<B>,
        discriminator: Discriminator<B>,
        optim_gen: OG,
        optim_disc: OD,
        device: &B::Device,
    ) -> Result<Restored<B, OG, OD>>
    where
        B: AutodiffBackend,
        OG: Optimizer<Generator<B>, B>,
        OD: Optimizer<Discriminator<B>, B>,
    {
        let Some(dir) = self.latest()? else {
            return Ok(Restored {
                generator,
                discriminator,
                optim_gen,
                optim_disc,
                session: None,
            });
        };

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let generator = generator.load_record(
            recorder
                .load(dir.join("generator"), device)
                .context("failed to load generator record")?,
        );
        let discriminator = discriminator.load_record(
            recorder
                .load(dir.join("discriminator"), device)
                .context("failed to load discriminator record")?,
        );
        let optim_gen = optim_gen.load_record(
            recorder
                .load(dir.join("optim_gen"), device)
                .context("failed to load generator optimizer record")?,
        );
        let optim_disc = optim_disc.load_record(
            recorder
                .load(dir.join("optim_disc"), device)
                .context("failed to load discriminator optimizer record")?,
        );

        let state = std::fs::read_to_string(dir.join("state.json"))
            .with_context(|| format!("missing session state in {}", dir.display()))?;
        let session: TrainSession = serde_json::from_str(&state)?;

        Ok(Restored {
            generator,
            discriminator,
            optim_gen,
            optim_disc,
            session: Some(session),
        })
    }

    fn prune(&self) -> Result<()> {
        let ordinals = self.ordinals()?;
        if ordinals.len() <= self.max_to_keep {
            return Ok(());
        }
        for &stale in &ordinals[..ordinals.len() - self.max_to_keep] {
            std::fs::remove_dir_all(self.record_dir(stale))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::discriminator::DiscriminatorConfig;
    use crate::model::generator::GeneratorConfig;
    use crate::training::TrainSession;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::optim::AdamConfig;
    use burn::tensor::{Distribution, Tensor};

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("facegan-ckpt-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn fake_record(manager: &CheckpointManager, ordinal: u64) {
        let dir = manager.record_dir(ordinal);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("state.json"), "{}").unwrap();
    }

    #[test]
    fn missing_directory_means_no_records() {
        let manager = CheckpointManager::new(temp_dir("missing"), 3);
        assert!(manager.latest().unwrap().is_none());
    }

    #[test]
    fn latest_compares_ordinals_numerically() {
        let manager = CheckpointManager::new(temp_dir("numeric"), 3);
        fake_record(&manager, 9);
        fake_record(&manager, 10);
        fake_record(&manager, 2);

        let latest = manager.latest().unwrap().unwrap();
        assert!(latest.ends_with("ckpt-10"));
    }

    #[test]
    fn prune_keeps_only_the_newest_records() {
        let manager = CheckpointManager::new(temp_dir("prune"), 3);
        for ordinal in 1..=5 {
            fake_record(&manager, ordinal);
        }

        manager.prune().unwrap();

        let ordinals = manager.ordinals().unwrap();
        assert_eq!(ordinals, vec![3, 4, 5]);
    }

    #[test]
    fn save_and_restore_round_trip() {
        let device = Default::default();
        let manager = CheckpointManager::new(temp_dir("roundtrip"), 3);

        let gen_config = GeneratorConfig::new().with_latent_dim(8).with_res_factor(1);
        let generator = gen_config.init::<TestAutodiffBackend>(&device);
        let discriminator =
            DiscriminatorConfig::new(gen_config.image_res()).init::<TestAutodiffBackend>(&device);
        let optim_gen = AdamConfig::new().init();
        let optim_disc = AdamConfig::new().init();

        let session = TrainSession {
            epoch: 51,
            gen_loss: vec![0.7],
            disc_loss: vec![1.2],
        };
        manager
            .save(&generator, &discriminator, &optim_gen, &optim_disc, &session)
            .unwrap();

        let noise = Tensor::<NdArray<f32>, 2>::random(
            [2, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let expected = generator.valid().forward(noise.clone());

        // Restore into freshly initialized networks.
        let fresh_gen = gen_config.init::<TestAutodiffBackend>(&device);
        let fresh_disc =
            DiscriminatorConfig::new(gen_config.image_res()).init::<TestAutodiffBackend>(&device);
        let restored = manager
            .restore(
                fresh_gen,
                fresh_disc,
                AdamConfig::new().init(),
                AdamConfig::new().init(),
                &device,
            )
            .unwrap();

        let session = restored.session.expect("session should be restored");
        assert_eq!(session.epoch, 51);
        assert_eq!(session.gen_loss, vec![0.7]);

        let actual = restored.generator.valid().forward(noise);
        assert_eq!(actual.into_data(), expected.into_data());
    }
}
