//! Vehicle condition and document photographs.
//!
//! The webview hands photos over as base64 data URLs. Every photo is
//! normalised the same way before upload: decoded, scaled down to fit
//! `MAX_DIMENSION` on its longest side and re-encoded as JPEG.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const MAX_DIMENSION: u32 = 1600;
pub const JPEG_QUALITY: u8 = 75;
pub const JPEG_MIME: &str = "image/jpeg";

/// Upper bound on the raw upload accepted from the webview.
const MAX_INPUT_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone, PartialEq, Eq)]
pub struct Photo {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Shape the webview sends for a captured or picked image.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpload {
    #[serde(alias = "file_name", alias = "name")]
    pub file_name: Option<String>,
    #[serde(alias = "data_url", alias = "uri", alias = "base64")]
    pub data_url: String,
}

impl Photo {
    /// Decode a `data:image/...;base64,` URL (a bare base64 string is also
    /// accepted) and normalise it for upload.
    pub fn from_data_url(data_url: &str, file_name: Option<&str>) -> AppResult<Self> {
        let payload = match data_url.split_once(',') {
            Some((header, rest)) if header.starts_with("data:") => {
                if !header.ends_with(";base64") {
                    return Err(AppError::Photo("only base64 data URLs are supported".into()));
                }
                rest
            }
            _ => data_url,
        };
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() / 4 * 3 > MAX_INPUT_BYTES {
            return Err(AppError::Photo("photo is too large".into()));
        }
        let raw = BASE64_STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| AppError::Photo(format!("invalid base64 payload: {e}")))?;
        Self::from_bytes(&raw, file_name)
    }

    pub fn from_upload(upload: &PhotoUpload) -> AppResult<Self> {
        Self::from_data_url(&upload.data_url, upload.file_name.as_deref())
    }

    /// Decode any supported image, downscale and re-encode as JPEG.
    pub fn from_bytes(raw: &[u8], file_name: Option<&str>) -> AppResult<Self> {
        let img = ImageReader::new(Cursor::new(raw))
            .with_guessed_format()
            .map_err(|e| AppError::Photo(e.to_string()))?
            .decode()?;
        let (w, h) = (img.width(), img.height());
        let bytes = compress(img)?;
        debug!(width = w, height = h, input = raw.len(), output = bytes.len(), "photo compressed");
        Ok(Self {
            file_name: jpeg_file_name(file_name),
            mime: JPEG_MIME.to_string(),
            bytes,
        })
    }
}

fn compress(img: DynamicImage) -> AppResult<Vec<u8>> {
    let img = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Triangle)
    } else {
        img
    };
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(out)
}

fn jpeg_file_name(file_name: Option<&str>) -> String {
    let stem = file_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => s,
        })
        .unwrap_or("photo");
    let safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.jpg")
}
