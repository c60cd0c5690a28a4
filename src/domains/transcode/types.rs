use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Media kind inferred from the declared file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Pdf,
    Unsupported,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

impl MediaKind {
    /// Classify by extension, case-insensitive.
    pub fn classify(filename: &str) -> Self {
        match file_extension(filename).as_deref() {
            Some("pdf") => MediaKind::Pdf,
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => MediaKind::Image,
            _ => MediaKind::Unsupported,
        }
    }
}

/// Lower-cased extension of a filename, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
}

/// One uploaded payload, as handed over by the request layer.
#[derive(Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub original_filename: String,
}

impl UploadedFile {
    pub fn new(bytes: Vec<u8>, original_filename: impl Into<String>) -> Self {
        Self {
            bytes,
            original_filename: original_filename.into(),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::classify(&self.original_filename)
    }

    pub fn extension(&self) -> Option<String> {
        file_extension(&self.original_filename)
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("original_filename", &self.original_filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// One decoded bitmap: a whole image or a single PDF page (1-based).
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub page_number: u32,
    pub image: DynamicImage,
}

/// Re-encoded raster output.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Document + thumbnail variants derived from one raster page.
#[derive(Debug, Clone)]
pub struct TranscodedPage {
    pub page_number: u32,
    pub document: EncodedImage,
    pub thumbnail: EncodedImage,
}

/// Lossy codec used for the stored document and thumbnail variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputCodec {
    Avif,
    Webp,
    Jpeg,
}

impl OutputCodec {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputCodec::Avif => "avif",
            OutputCodec::Webp => "webp",
            OutputCodec::Jpeg => "jpg",
        }
    }
}

impl FromStr for OutputCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "avif" => Ok(OutputCodec::Avif),
            "webp" => Ok(OutputCodec::Webp),
            "jpg" | "jpeg" => Ok(OutputCodec::Jpeg),
            other => Err(format!("Unknown output codec: {}", other)),
        }
    }
}

/// How the document variant is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalePolicy {
    /// Fit inside a `max x max` box.
    BoundingBox,
    /// Legacy rule: landscape pages constrain the height, others the width.
    LongEdge,
}

/// Scale-down and codec policy for stored variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    pub codec: OutputCodec,
    pub quality: u8,
    pub document_max_dimension: u32,
    pub document_policy: ScalePolicy,
    pub thumbnail_max_dimension: u32,
    pub ghostscript_path: String,
    pub pdf_dpi: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            codec: OutputCodec::Avif,
            quality: 50,
            document_max_dimension: 1920,
            document_policy: ScalePolicy::BoundingBox,
            thumbnail_max_dimension: 128,
            ghostscript_path: "gs".to_string(),
            pdf_dpi: 150,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(MediaKind::classify("Receipt.PDF"), MediaKind::Pdf);
        assert_eq!(MediaKind::classify("scan.JpEg"), MediaKind::Image);
        assert_eq!(MediaKind::classify("photo.webp"), MediaKind::Image);
        assert_eq!(MediaKind::classify("notes.docx"), MediaKind::Unsupported);
        assert_eq!(MediaKind::classify("no_extension"), MediaKind::Unsupported);
        assert_eq!(MediaKind::classify("trailing."), MediaKind::Unsupported);
    }

    #[test]
    fn test_codec_parsing() {
        assert_eq!("AVIF".parse::<OutputCodec>().unwrap(), OutputCodec::Avif);
        assert_eq!("jpeg".parse::<OutputCodec>().unwrap(), OutputCodec::Jpeg);
        assert_eq!(OutputCodec::Jpeg.extension(), "jpg");
        assert!("heic".parse::<OutputCodec>().is_err());
    }

    #[test]
    fn test_defaults_use_latest_policy() {
        let config = TranscodeConfig::default();
        assert_eq!(config.codec, OutputCodec::Avif);
        assert_eq!(config.quality, 50);
        assert_eq!(config.document_max_dimension, 1920);
        assert_eq!(config.document_policy, ScalePolicy::BoundingBox);
        assert_eq!(config.thumbnail_max_dimension, 128);
    }
}
