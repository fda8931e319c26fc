use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{ImageFormat, ImageReader};

use crate::config::ImageLimits;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid or unsupported image format")]
    InvalidFormat,
    #[error("Image exceeds the maximum allowed size")]
    TooLarge,
    #[error("Image is below the minimum allowed dimensions")]
    TooSmall,
}

// Decoded, bounds-checked upload. Lives for one request only.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    limits: ImageLimits,
}

impl ImageValidator {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }

    pub fn validate(&self, raw: &[u8]) -> Result<ImagePayload, ValidationError> {
        let bytes = match strip_data_url_prefix(raw) {
            Some(encoded) => BASE64
                .decode(encoded.trim())
                .map_err(|_| ValidationError::InvalidFormat)?,
            None => raw.to_vec(),
        };

        if bytes.len() > self.limits.max_bytes {
            return Err(ValidationError::TooLarge);
        }

        let format = image::guess_format(&bytes).map_err(|_| ValidationError::InvalidFormat)?;
        if !matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
        ) {
            return Err(ValidationError::InvalidFormat);
        }

        let (width, height) = ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|_| ValidationError::InvalidFormat)?;

        if width > self.limits.max_dimension || height > self.limits.max_dimension {
            return Err(ValidationError::TooLarge);
        }
        if width < self.limits.min_dimension || height < self.limits.min_dimension {
            return Err(ValidationError::TooSmall);
        }

        Ok(ImagePayload {
            bytes,
            format,
            width,
            height,
        })
    }
}

// Browser clients sometimes upload the data URL blob verbatim
// ("data:image/png;base64,...."); accept it and decode the remainder.
fn strip_data_url_prefix(raw: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(raw).ok()?;
    let rest = text.strip_prefix("data:")?;
    let (_mime, encoded) = rest.split_once(";base64,")?;
    Some(encoded)
}
