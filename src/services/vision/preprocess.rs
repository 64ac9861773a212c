//! Image preprocessing: encoded bytes -> normalized NHWC tensor

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::{AppError, AppResult, ResultExt};

pub const INPUT_SIZE: u32 = 224;
pub const INPUT_CHANNELS: usize = 3;

/// Rank-4 `[1, 224, 224, 3]` tensor, channel values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, INPUT_SIZE as usize, INPUT_SIZE as usize, INPUT_CHANNELS]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Builds a tensor from raw NHWC values. Used by tests and custom callers.
    pub fn from_data(data: Vec<f32>) -> AppResult<Self> {
        let expected = (INPUT_SIZE * INPUT_SIZE) as usize * INPUT_CHANNELS;
        if data.len() != expected {
            return Err(AppError::Inference(format!(
                "tensor has {} values, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Self { data })
    }

    /// Re-encodes the tensor as a PNG, for backends that only accept encoded images.
    pub fn to_png(&self) -> AppResult<Vec<u8>> {
        let size = INPUT_SIZE as usize;
        let rgb = RgbImage::from_fn(INPUT_SIZE, INPUT_SIZE, |x, y| {
            let offset = (y as usize * size + x as usize) * INPUT_CHANNELS;
            let px = |c: usize| (self.data[offset + c] * 255.0).round().clamp(0.0, 255.0) as u8;
            image::Rgb([px(0), px(1), px(2)])
        });

        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .inference_err("encode tensor as png")?;
        Ok(buf)
    }
}

/// Decodes a base64 payload; browser data URLs (`data:image/png;base64,...`) are accepted.
pub fn decode_base64_image(data: &str) -> AppResult<Vec<u8>> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    STANDARD
        .decode(payload.trim())
        .inference_err("invalid base64 image data")
}

/// Decodes, resizes (bilinear) to 224x224 and scales each channel by 1/255.
pub fn preprocess_image(bytes: &[u8]) -> AppResult<ImageTensor> {
    let decoded = image::load_from_memory(bytes).inference_err("failed to decode image")?;
    let resized = decoded
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let data = resized
        .as_raw()
        .iter()
        .map(|&value| value as f32 / 255.0)
        .collect();

    Ok(ImageTensor { data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn produces_224_square_normalized_tensor() {
        let img = RgbImage::from_pixel(64, 32, image::Rgb([255, 0, 51]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let tensor = preprocess_image(&bytes).unwrap();
        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.data().len(), 224 * 224 * 3);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((tensor.data()[0] - 1.0).abs() < 1e-6);
        assert!(tensor.data()[1].abs() < 1e-6);
        assert!((tensor.data()[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_input_is_expanded_to_three_channels() {
        let img = image::GrayImage::from_pixel(10, 10, image::Luma([128]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);

        let tensor = preprocess_image(&bytes).unwrap();
        let first = &tensor.data()[..3];
        assert!(first.iter().all(|v| (v - 128.0 / 255.0).abs() < 1e-6));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = preprocess_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, AppError::Inference(_)));
    }

    #[test]
    fn base64_accepts_plain_and_data_url() {
        assert_eq!(decode_base64_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_image("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_base64_image("***").is_err());
    }

    #[test]
    fn png_reencoding_preserves_pixels() {
        let img = RgbImage::from_pixel(224, 224, image::Rgb([10, 20, 30]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);
        let tensor = preprocess_image(&bytes).unwrap();

        let again = preprocess_image(&tensor.to_png().unwrap()).unwrap();
        assert_eq!(again, tensor);
    }

    #[test]
    fn from_data_checks_length() {
        assert!(ImageTensor::from_data(vec![0.0; 3]).is_err());
        assert!(ImageTensor::from_data(vec![0.0; 224 * 224 * 3]).is_ok());
    }
}
