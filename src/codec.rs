// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image decode/encode helpers for uploads and annotated output.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::{GoniometryError, Result};

/// Decode image bytes of any format `image` supports.
///
/// # Errors
///
/// Returns [`GoniometryError::ImageError`] for empty or undecodable input.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(GoniometryError::ImageError("empty file".to_string()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| GoniometryError::ImageError(format!("Failed to decode image: {e}")))
}

/// Downscale `image` so its longest side is at most `max_dim`, keeping the
/// aspect ratio. Smaller images are returned unchanged.
#[must_use]
pub fn limit_size(image: DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if max_dim == 0 || width.max(height) <= max_dim {
        return image;
    }
    // `resize` preserves aspect ratio within the bounding box
    image.resize(max_dim, max_dim, FilterType::Triangle)
}

/// Encode an RGB raster as PNG.
///
/// # Errors
///
/// Returns [`GoniometryError::ImageError`] if encoding fails.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| GoniometryError::ImageError(format!("Failed to encode PNG: {e}")))?;
    Ok(buffer)
}

/// Wrap PNG bytes in a `data:image/png;base64,` URI.
#[must_use]
pub fn to_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        encode_png(&image).unwrap()
    }

    #[test]
    fn test_decode_roundtrip() {
        let bytes = sample_png(12, 7);
        let image = decode(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (12, 7));
        assert_eq!(image.to_rgb8().get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_empty_and_garbage() {
        let err = decode(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Image error: empty file");
        assert!(decode(b"not an image").is_err());
    }

    #[test]
    fn test_limit_size() {
        let big = DynamicImage::ImageRgb8(RgbImage::new(1600, 900));
        let small = limit_size(big, 800);
        assert_eq!((small.width(), small.height()), (800, 450));

        let tiny = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        let same = limit_size(tiny, 800);
        assert_eq!((same.width(), same.height()), (300, 200));
    }

    #[test]
    fn test_data_uri() {
        let uri = to_data_uri(&[0x89, b'P', b'N', b'G']);
        assert_eq!(uri, "data:image/png;base64,iVBORw==");
    }
}
