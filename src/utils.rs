use anyhow::{anyhow, ensure, Context, Result};
use burn::prelude::*;
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use std::path::Path;
use std::time::Duration;

/// Load an image file, center-crop it to a square and resize it to
/// `resolution` x `resolution`.
pub fn load_face_image<P: AsRef<Path>>(path: P, resolution: u32) -> Result<RgbImage> {
    let path = path.as_ref();
    let img = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgb8();

    let (width, height) = img.dimensions();
    let side = width.min(height);
    let cropped = imageops::crop_imm(&img, (width - side) / 2, (height - side) / 2, side, side)
        .to_image();

    Ok(imageops::resize(
        &cropped,
        resolution,
        resolution,
        FilterType::Triangle,
    ))
}

/// Convert an RGB image into a `[3, H, W]` tensor with values in 0.0-1.0.
pub fn image_to_tensor<B: Backend>(img: &RgbImage, device: &B::Device) -> Tensor<B, 3> {
    let (width, height) = img.dimensions();
    let floats = img
        .as_raw()
        .iter()
        .map(|&p| p as f32 / 255.0)
        .collect::<Vec<_>>();

    let data = TensorData::new(floats, [height as usize, width as usize, 3]);
    Tensor::<B, 3>::from_data(data, device).permute([2, 0, 1])
}

/// Convert a `[C, H, W]` tensor with values in 0.0-1.0 into an RGB image.
/// Supports both 1 and 3 channels image
pub fn tensor_to_image<B: Backend>(tensor: Tensor<B, 3>) -> Result<RgbImage> {
    let [channels, height, width] = tensor.dims();
    ensure!(
        channels == 1 || channels == 3,
        "unsupported channel count {channels}"
    );

    let values = tensor
        .permute([1, 2, 0])
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("failed to read tensor data: {e:?}"))?;

    let to_byte = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    let mut img = RgbImage::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            let base = (y * width + x) * channels;
            let pixel = if channels == 1 {
                let v = to_byte(values[base]);
                Rgb([v, v, v])
            } else {
                Rgb([
                    to_byte(values[base]),
                    to_byte(values[base + 1]),
                    to_byte(values[base + 2]),
                ])
            };
            img.put_pixel(x as u32, y as u32, pixel);
        }
    }

    Ok(img)
}

/// Format a duration as `h:mm:ss.ss`.
pub fn fmt_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let hours = (secs / 3600.0) as u64;
    let minutes = ((secs % 3600.0) / 60.0) as u64;
    let seconds = secs % 60.0;
    format!("{hours}:{minutes:02}:{seconds:05.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn crops_and_resizes_to_square() {
        let dir = std::env::temp_dir().join(format!("facegan-utils-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wide.png");
        RgbImage::from_pixel(60, 40, Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();

        let img = load_face_image(&path, 32).unwrap();
        assert_eq!(img.dimensions(), (32, 32));
    }

    #[test]
    fn image_round_trips_through_tensor() {
        let device = Default::default();
        let mut img = RgbImage::new(4, 4);
        for (i, pixel) in img.pixels_mut().enumerate() {
            *pixel = Rgb([i as u8 * 10, 255 - i as u8 * 10, 128]);
        }

        let tensor = image_to_tensor::<TestBackend>(&img, &device);
        assert_eq!(tensor.dims(), [3, 4, 4]);

        let max = tensor.clone().max().into_scalar();
        let min = tensor.clone().min().into_scalar();
        assert!((0.0..=1.0).contains(&min));
        assert!((0.0..=1.0).contains(&max));

        let back = tensor_to_image(tensor).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn rejects_unsupported_channel_counts() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 3>::zeros([2, 4, 4], &device);
        assert!(tensor_to_image(tensor).is_err());
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(fmt_duration(Duration::from_secs_f64(3661.5)), "1:01:01.50");
        assert_eq!(fmt_duration(Duration::from_secs(59)), "0:00:59.00");
    }
}
