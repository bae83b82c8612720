//! Image attachments
//!
//! Images are byte-oriented: raw encoded bytes plus their container format
//! and optional EXIF metadata. Dimensions are read straight from the format
//! headers so no decoder dependency is needed. Wire transport is base64.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::utils::error::{LlmError, Result};

/// Container formats accepted by the vendors we dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    /// MIME type used in data URIs
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Detect the format from the leading magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

/// An image attachment on a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Raw encoded bytes, base64 on the wire
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub format: ImageFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub exif: HashMap<String, String>,
}

impl Image {
    /// Build from raw encoded bytes, sniffing the container format
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(LlmError::conversion("empty image bytes"));
        }
        let format = ImageFormat::sniff(&bytes)
            .ok_or_else(|| LlmError::conversion("unrecognized image format"))?;
        Ok(Self {
            content: bytes,
            format,
            name: None,
            exif: HashMap::new(),
        })
    }

    /// Build from a base64 string
    pub fn from_base64(data: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| LlmError::conversion(format!("invalid base64 image data: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Load from a file on disk; the stem becomes the attachment name
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| LlmError::conversion(format!("failed to read image {}: {e}", path.display())))?;
        let mut image = Self::from_bytes(bytes)?;
        image.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        Ok(image)
    }

    /// Base64 export for wire transport
    pub fn as_base64(&self) -> String {
        BASE64.encode(&self.content)
    }

    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }

    /// Pixel dimensions read from the format header, when present
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let b = &self.content;
        match self.format {
            ImageFormat::Png => {
                // IHDR starts at offset 16 after the signature and chunk header
                if b.len() < 24 {
                    return None;
                }
                let w = u32::from_be_bytes([b[16], b[17], b[18], b[19]]);
                let h = u32::from_be_bytes([b[20], b[21], b[22], b[23]]);
                Some((w, h))
            }
            ImageFormat::Gif => {
                if b.len() < 10 {
                    return None;
                }
                let w = u16::from_le_bytes([b[6], b[7]]) as u32;
                let h = u16::from_le_bytes([b[8], b[9]]) as u32;
                Some((w, h))
            }
            ImageFormat::Jpeg => jpeg_dimensions(b),
            ImageFormat::Webp => webp_dimensions(b),
        }
    }

    pub fn width(&self) -> Option<u32> {
        self.dimensions().map(|(w, _)| w)
    }

    pub fn height(&self) -> Option<u32> {
        self.dimensions().map(|(_, h)| h)
    }
}

/// Scan JPEG segments for the first start-of-frame marker
fn jpeg_dimensions(b: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2usize;
    while i + 9 < b.len() {
        if b[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = b[i + 1];
        // SOF0..SOF15 minus DHT/JPG/DAC carry the frame header
        let is_sof = (0xC0..=0xCF).contains(&marker)
            && marker != 0xC4
            && marker != 0xC8
            && marker != 0xCC;
        if is_sof {
            let h = u16::from_be_bytes([b[i + 5], b[i + 6]]) as u32;
            let w = u16::from_be_bytes([b[i + 7], b[i + 8]]) as u32;
            return Some((w, h));
        }
        if marker == 0xD8 || (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            i += 2;
            continue;
        }
        let len = u16::from_be_bytes([b[i + 2], b[i + 3]]) as usize;
        i += 2 + len;
    }
    None
}

/// Read the canvas size from VP8X, VP8 or VP8L chunks
fn webp_dimensions(b: &[u8]) -> Option<(u32, u32)> {
    if b.len() < 30 {
        return None;
    }
    match &b[12..16] {
        b"VP8X" => {
            let w = 1 + u32::from_le_bytes([b[24], b[25], b[26], 0]);
            let h = 1 + u32::from_le_bytes([b[27], b[28], b[29], 0]);
            Some((w, h))
        }
        b"VP8 " => {
            // lossy bitstream: sync code then 14-bit dimensions
            if b[23] != 0x9D || b[24] != 0x01 || b[25] != 0x2A {
                return None;
            }
            let w = (u16::from_le_bytes([b[26], b[27]]) & 0x3FFF) as u32;
            let h = (u16::from_le_bytes([b[28], b[29]]) & 0x3FFF) as u32;
            Some((w, h))
        }
        b"VP8L" => {
            if b[20] != 0x2F {
                return None;
            }
            let bits = u32::from_le_bytes([b[21], b[22], b[23], b[24]]);
            let w = (bits & 0x3FFF) + 1;
            let h = ((bits >> 14) & 0x3FFF) + 1;
            Some((w, h))
        }
        _ => None,
    }
}

/// Serde adapter encoding byte fields as base64 strings
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
