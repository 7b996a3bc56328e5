//! Transport payload → RGB pixel buffer.
//!
//! Clients send images as base64 text, optionally wrapped in a data URI
//! (`data:image/jpeg;base64,...`). The decoded image is always returned as
//! 8-bit RGB; detector and recognizer both consume that channel order.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

/// Standard alphabet, padding optional on decode.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported or corrupt image data: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode a base64 (or data-URI) image payload into an RGB pixel buffer.
pub fn decode(payload: &str) -> Result<RgbImage, DecodeError> {
    let bytes = decode_base64(strip_header(payload))?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(&bytes)?;
    let rgb = image.to_rgb8();
    tracing::debug!(
        width = rgb.width(),
        height = rgb.height(),
        bytes = bytes.len(),
        "decoded image payload"
    );
    Ok(rgb)
}

/// Drop a `data:<mime>;base64,` style header if present.
fn strip_header(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    }
}

fn decode_base64(body: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(PAYLOAD_ENGINE.decode(compact)?)
}

/// Encode raw bytes with the standard padded alphabet.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Serde adapter storing byte buffers as base64 strings.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_base64(&text).or_else(|e| match e {
            super::DecodeError::Empty => Ok(Vec::new()),
            other => Err(serde::de::Error::custom(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_base64(img: &RgbImage) -> String {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        encode_base64(buf.get_ref())
    }

    #[test]
    fn test_decode_plain_base64() {
        let img = RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]));
        let decoded = decode(&png_base64(&img)).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_strips_data_uri_header() {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 0, 0]));
        let payload = format!("data:image/png;base64,{}", png_base64(&img));
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([200, 0, 0]));
    }

    #[test]
    fn test_decode_ignores_whitespace_and_missing_padding() {
        let img = RgbImage::from_pixel(5, 3, Rgb([1, 2, 3]));
        let encoded = png_base64(&img);
        let trimmed = encoded.trim_end_matches('=');
        let (head, tail) = trimmed.split_at(trimmed.len() / 2);
        let wrapped = format!("{head}\n{tail}");
        let decoded = decode(&wrapped).unwrap();
        assert_eq!(decoded.dimensions(), (5, 3));
    }

    #[test]
    fn test_decode_grayscale_becomes_rgb() {
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([77]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();
        let decoded = decode(&encode_base64(buf.get_ref())).unwrap();
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(matches!(decode("not base64 at all!"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let payload = encode_base64(b"definitely not an image");
        assert!(matches!(decode(&payload), Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
        assert!(matches!(decode("data:image/png;base64,"), Err(DecodeError::Empty)));
    }
}
