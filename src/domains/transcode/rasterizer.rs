//! PDF rasterization.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::errors::{DomainError, DomainResult};

use super::types::RasterPage;

/// Turns a PDF into one raster page per PDF page, in page order.
pub trait PdfRasterizer: Send + Sync {
    fn rasterize(&self, filename: &str, pdf: &[u8]) -> DomainResult<Vec<RasterPage>>;
}

/// PDF rasterizer using external tools (gs)
pub struct GhostscriptRasterizer {
    ghostscript_path: String,
    dpi: u32,
}

impl GhostscriptRasterizer {
    pub fn new(ghostscript_path: Option<String>, dpi: u32) -> Self {
        Self {
            ghostscript_path: ghostscript_path.unwrap_or_else(|| "gs".to_string()),
            dpi,
        }
    }

    fn page_path(dir: &Path, page_number: u32) -> std::path::PathBuf {
        dir.join(format!("page-{:04}.png", page_number))
    }
}

impl PdfRasterizer for GhostscriptRasterizer {
    fn rasterize(&self, filename: &str, pdf: &[u8]) -> DomainResult<Vec<RasterPage>> {
        // Dropping the directory removes whatever is left on every exit path.
        let work_dir = tempfile::Builder::new()
            .prefix("pdf-raster-")
            .tempdir()
            .map_err(|e| DomainError::Internal(format!("Failed to create temp dir: {}", e)))?;

        let input_path = work_dir.path().join("input.pdf");
        fs::write(&input_path, pdf)
            .map_err(|e| DomainError::Internal(format!("Failed to write to temp file: {}", e)))?;

        let output_pattern = work_dir.path().join("page-%04d.png");
        let resolution = format!("-r{}", self.dpi);
        let output_file = format!("-sOutputFile={}", output_pattern.to_string_lossy());
        let input = input_path.to_string_lossy().to_string();
        let output = Command::new(&self.ghostscript_path)
            .args([
                "-dSAFER",
                "-dBATCH",
                "-dNOPAUSE",
                "-dQUIET",
                "-sDEVICE=png16m",
                resolution.as_str(),
                output_file.as_str(),
                input.as_str(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| DomainError::transcode(filename, format!("Failed to execute ghostscript: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::transcode(filename, format!("Ghostscript error: {}", error.trim())));
        }

        let mut pages = Vec::new();
        let mut page_number = 1;
        loop {
            let page_path = Self::page_path(work_dir.path(), page_number);
            if !page_path.exists() {
                break;
            }
            let decoded = image::open(&page_path);
            // The intermediate page file is not needed past this point.
            if let Err(e) = fs::remove_file(&page_path) {
                log::warn!("Failed to remove rasterized page {}: {}", page_path.display(), e);
            }
            let image = decoded.map_err(|e| {
                DomainError::transcode(filename, format!("Failed to decode page {}: {}", page_number, e))
            })?;
            pages.push(RasterPage { page_number, image });
            page_number += 1;
        }

        if pages.is_empty() {
            return Err(DomainError::transcode(filename, "PDF produced no pages"));
        }

        log::debug!("Rasterized {} page(s) from {}", pages.len(), filename);
        Ok(pages)
    }
}
