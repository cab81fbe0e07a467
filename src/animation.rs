use anyhow::{ensure, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::Frame;
use std::fs::File;
use std::path::Path;

use crate::preview::PreviewManifest;

/// Concatenate all preview frames into one looping GIF, ordered by the
/// explicit epoch recorded in the manifest. Returns the frame count.
pub fn export_animation(
    preview_dir: impl AsRef<Path>,
    gif_path: impl AsRef<Path>,
) -> Result<usize> {
    let preview_dir = preview_dir.as_ref();

    let mut manifest = PreviewManifest::load(preview_dir)?;
    ensure!(
        !manifest.frames.is_empty(),
        "no preview frames found under {}",
        preview_dir.display()
    );
    manifest.frames.sort_by_key(|frame| frame.epoch);

    let file = File::create(gif_path.as_ref())
        .with_context(|| format!("failed to create {}", gif_path.as_ref().display()))?;
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite)?;

    let count = manifest.frames.len();
    for frame in manifest.frames {
        let path = preview_dir.join(&frame.file);
        let image = image::open(&path)
            .with_context(|| format!("failed to open preview frame {}", path.display()))?
            .to_rgba8();
        encoder.encode_frame(Frame::new(image))?;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("facegan-anim-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn writes_one_gif_frame_per_manifest_entry() {
        let dir = temp_dir("frames");
        let mut manifest = PreviewManifest::default();
        for epoch in [2usize, 1] {
            let file = format!("image_at_epoch_{epoch}.png");
            RgbaImage::from_pixel(8, 8, Rgba([epoch as u8 * 100, 0, 0, 255]))
                .save(dir.join(&file))
                .unwrap();
            manifest.insert(epoch, file);
        }
        manifest.save(&dir).unwrap();

        let gif = dir.join("progress.gif");
        let frames = export_animation(&dir, &gif).unwrap();

        assert_eq!(frames, 2);
        assert!(gif.metadata().unwrap().len() > 0);
    }

    #[test]
    fn empty_manifest_is_an_error() {
        let dir = temp_dir("empty");
        assert!(export_animation(&dir, dir.join("progress.gif")).is_err());
    }
}
