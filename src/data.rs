use anyhow::{bail, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use std::path::Path;
use walkdir::WalkDir;

use crate::utils::{image_to_tensor, load_face_image};

/// All face images under a directory tree, cropped to aspect ratio, resized
/// to a fixed resolution and scaled into 0.0-1.0.
#[derive(Debug, Clone)]
pub struct FaceDataset<B: Backend> {
    images: Vec<Tensor<B, 3>>,
}

impl<B: Backend> FaceDataset<B> {
    pub fn new<P: AsRef<Path>>(root: P, resolution: usize, device: &B::Device) -> Result<Self> {
        let mut images = Vec::new();
        for entry in WalkDir::new(root.as_ref()).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if let Some(ext) = path.extension() {
                if matches!(ext.to_str(), Some("jpg") | Some("jpeg") | Some("png")) {
                    let image = load_face_image(path, resolution as u32)?;
                    images.push(image_to_tensor(&image, device));
                }
            }
        }

        if images.is_empty() {
            bail!(
                "no face images found under {}",
                root.as_ref().display()
            );
        }

        Ok(Self { images })
    }
}

impl<B: Backend> Dataset<Tensor<B, 3>> for FaceDataset<B> {
    fn get(&self, index: usize) -> Option<Tensor<B, 3>> {
        self.images.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

#[derive(Debug, Clone)]
pub struct FaceBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct FaceBatcher;

impl<B: Backend> Batcher<B, Tensor<B, 3>, FaceBatch<B>> for FaceBatcher {
    fn batch(&self, items: Vec<Tensor<B, 3>>, device: &B::Device) -> FaceBatch<B> {
        let size = items.len();
        let images = items
            .into_iter()
            .map(|image| image.unsqueeze_dim(0))
            .collect::<Vec<_>>();

        FaceBatch {
            images: Tensor::cat(images, 0).to_device(device),
            size,
        }
    }
}
