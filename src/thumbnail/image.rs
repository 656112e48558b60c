use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, Limits};

use crate::error::ThumbnailError;

pub const JPEG_QUALITY: u8 = 80;

// Decoder guard rails against decompression bombs
pub const MAX_IMAGE_DIMENSION: u32 = 65535;
pub const MAX_PIXEL_COUNT: u64 = 100_000_000;
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

pub fn validate_dimensions(width: u32, height: u32) -> Result<(), ThumbnailError> {
    if width == 0 || height == 0 {
        return Err(ThumbnailError::UnsupportedFormat(
            "image has zero width or height".into(),
        ));
    }
    let pixel_count = (width as u64) * (height as u64);
    if pixel_count > MAX_PIXEL_COUNT {
        return Err(ThumbnailError::UnsupportedFormat(format!(
            "too many pixels: {} (max {})",
            pixel_count, MAX_PIXEL_COUNT
        )));
    }
    Ok(())
}

/// Decode a file, sniffing the format from its content rather than its extension.
pub fn decode_file(path: &Path) -> Result<DynamicImage, ThumbnailError> {
    let mut reader = ImageReader::open(path)
        .map_err(|e| ThumbnailError::from_io(e, path))?
        .with_guessed_format()
        .map_err(|e| ThumbnailError::from_io(e, path))?;

    if reader.format().is_none() {
        return Err(ThumbnailError::UnsupportedFormat(format!(
            "unrecognised image data: {}",
            path.display()
        )));
    }
    reader.limits(decode_limits());
    Ok(reader.decode()?)
}

/// Shrink to fit a `max_dimension` square, keeping the aspect ratio, and encode as JPEG.
///
/// Images already inside the box are re-encoded at their own size.
pub fn encode_thumbnail(img: DynamicImage, max_dimension: u32) -> Result<Vec<u8>, ThumbnailError> {
    validate_dimensions(img.width(), img.height())?;

    let resized = if img.width() > max_dimension || img.height() > max_dimension {
        img.thumbnail(max_dimension, max_dimension)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};

    #[test]
    fn keeps_aspect_ratio_inside_the_box() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(400, 100, Rgba([10, 20, 30, 255])));
        let jpeg = encode_thumbnail(img, 200).unwrap();

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (200, 50));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 0])));
        let jpeg = encode_thumbnail(img, 200).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn corrupt_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n but not really").unwrap();

        let err = decode_file(&path).unwrap_err();
        assert!(matches!(err, ThumbnailError::UnsupportedFormat(_)), "{:?}", err);

        let path = dir.path().join("random.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();
        let err = decode_file(&path).unwrap_err();
        assert!(matches!(err, ThumbnailError::UnsupportedFormat(_)), "{:?}", err);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = decode_file(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, ThumbnailError::NotFound(_)));
    }

    #[test]
    fn zero_sized_images_are_rejected() {
        assert!(validate_dimensions(0, 10).is_err());
        assert!(validate_dimensions(20_000, 20_000).is_err());
        assert!(validate_dimensions(1920, 1080).is_ok());
    }
}
