// src/serving/resize.rs

//! Display-size enforcement for served images.

use std::io::Cursor;

use bytes::Bytes;
use image::ImageFormat;
use image::imageops::FilterType;

use crate::error::Result;
use crate::models::StoredObject;

fn format_for(content_type: &str) -> Option<ImageFormat> {
    match content_type {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Scale `object` so its longest edge is at most `size` pixels.
///
/// Images already within bounds are returned untouched. Objects that are not
/// a decodable PNG or JPEG (including everything stored as
/// `application/octet-stream`) are passed through as stored.
pub fn fit_within(object: StoredObject, size: u32) -> Result<StoredObject> {
    let Some(format) = format_for(&object.content_type) else {
        return Ok(object);
    };

    let decoded = match image::load_from_memory_with_format(&object.bytes, format) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!("serving undecodable {} as stored: {}", object.content_type, e);
            return Ok(object);
        }
    };
    if decoded.width().max(decoded.height()) <= size {
        return Ok(object);
    }

    let scaled = decoded.resize(size, size, FilterType::Triangle);
    let mut buf = Vec::new();
    scaled.write_to(&mut Cursor::new(&mut buf), format)?;

    Ok(StoredObject {
        bytes: Bytes::from(buf),
        ..object
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, RgbImage};

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        Bytes::from(buf)
    }

    fn object(bytes: Bytes, content_type: &str) -> StoredObject {
        StoredObject {
            bytes,
            content_type: content_type.to_string(),
            source_url: None,
        }
    }

    #[test]
    fn test_large_png_is_scaled_to_longest_edge() {
        let served = fit_within(object(encoded(900, 600, ImageFormat::Png), "image/png"), 450).unwrap();

        let decoded = image::load_from_memory_with_format(&served.bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (450, 300));
        assert_eq!(served.content_type, "image/png");
    }

    #[test]
    fn test_tall_jpeg_is_scaled() {
        let served =
            fit_within(object(encoded(200, 1000, ImageFormat::Jpeg), "image/jpeg"), 450).unwrap();

        let decoded = image::load_from_memory_with_format(&served.bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (90, 450));
    }

    #[test]
    fn test_small_image_is_untouched() {
        let bytes = encoded(100, 50, ImageFormat::Png);
        let served = fit_within(object(bytes.clone(), "image/png"), 450).unwrap();
        assert_eq!(served.bytes, bytes);
    }

    #[test]
    fn test_opaque_objects_pass_through() {
        let garbage = Bytes::from_static(b"not really a jpeg");
        let served = fit_within(object(garbage.clone(), "image/jpeg"), 450).unwrap();
        assert_eq!(served.bytes, garbage);

        let big = encoded(900, 900, ImageFormat::Png);
        let served = fit_within(object(big.clone(), "application/octet-stream"), 450).unwrap();
        assert_eq!(served.bytes, big);
    }
}
