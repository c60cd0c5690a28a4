use std::sync::Arc;

use image::DynamicImage;
use tokio::task;

use crate::errors::{DomainError, DomainResult};

use super::encoder;
use super::rasterizer::{GhostscriptRasterizer, PdfRasterizer};
use super::scaling::{document_dimensions, scale_to, thumbnail_dimensions};
use super::types::{EncodedImage, MediaKind, RasterPage, TranscodeConfig, TranscodedPage, UploadedFile};

/// Turns uploads into normalized document and thumbnail variants.
#[derive(Clone)]
pub struct DocumentTranscoder {
    config: TranscodeConfig,
    rasterizer: Arc<dyn PdfRasterizer>,
}

impl DocumentTranscoder {
    pub fn new(config: TranscodeConfig, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        Self { config, rasterizer }
    }

    /// Transcoder backed by the Ghostscript binary named in the config.
    pub fn with_ghostscript(config: TranscodeConfig) -> Self {
        let rasterizer = GhostscriptRasterizer::new(Some(config.ghostscript_path.clone()), config.pdf_dpi);
        Self::new(config, Arc::new(rasterizer))
    }

    /// Decode an upload into raster pages. PDFs yield one page per PDF page.
    pub fn rasterize(&self, file: &UploadedFile) -> DomainResult<Vec<RasterPage>> {
        match file.media_kind() {
            MediaKind::Image => {
                let image = image::load_from_memory(&file.bytes)
                    .map_err(|e| DomainError::transcode(&file.original_filename, format!("Failed to load image: {}", e)))?;
                Ok(vec![RasterPage { page_number: 1, image }])
            }
            MediaKind::Pdf => {
                let mut pages = self.rasterizer.rasterize(&file.original_filename, &file.bytes)?;
                pages.sort_by_key(|page| page.page_number);
                Ok(pages)
            }
            MediaKind::Unsupported => Err(DomainError::UnsupportedMediaKind(file.original_filename.clone())),
        }
    }

    /// Produce both variants of one page.
    pub fn transcode_page(&self, filename: &str, page: &RasterPage) -> DomainResult<TranscodedPage> {
        let (width, height) = (page.image.width(), page.image.height());

        let document = self.encode_variant(
            filename,
            &page.image,
            document_dimensions(width, height, self.config.document_max_dimension, self.config.document_policy),
        )?;
        let thumbnail_size = thumbnail_dimensions(width, height, self.config.thumbnail_max_dimension);
        let thumbnail = self.encode_variant(filename, &page.image, thumbnail_size)?;

        Ok(TranscodedPage {
            page_number: page.page_number,
            document,
            thumbnail,
        })
    }

    fn encode_variant(&self, filename: &str, image: &DynamicImage, size: (u32, u32)) -> DomainResult<EncodedImage> {
        let scaled = scale_to(image, size);
        let bytes = encoder::encode(&scaled, self.config.codec, self.config.quality)
            .map_err(|reason| DomainError::transcode(filename, reason))?;
        Ok(EncodedImage {
            bytes,
            width: scaled.width(),
            height: scaled.height(),
        })
    }

    /// Synchronous transcoding of a whole upload. Runs CPU-bound; call from a blocking context.
    pub fn transcode_blocking(&self, file: &UploadedFile) -> DomainResult<Vec<TranscodedPage>> {
        let pages = self.rasterize(file)?;
        let mut transcoded = Vec::with_capacity(pages.len());
        for page in &pages {
            transcoded.push(self.transcode_page(&file.original_filename, page)?);
        }
        log::debug!(
            "Transcoded {} into {} page(s) as {:?}",
            file.original_filename,
            transcoded.len(),
            self.config.codec
        );
        Ok(transcoded)
    }

    /// Transcode on the blocking thread pool.
    pub async fn transcode(&self, file: UploadedFile) -> DomainResult<Vec<TranscodedPage>> {
        let transcoder = self.clone();
        task::spawn_blocking(move || transcoder.transcode_blocking(&file))
            .await
            .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))?
    }

    /// One page of an already rasterized upload, scaled to document bounds.
    pub fn document_page(&self, filename: &str, pages: &[RasterPage], page_number: u32) -> DomainResult<DynamicImage> {
        let page = pages
            .iter()
            .find(|page| page.page_number == page_number)
            .ok_or_else(|| DomainError::transcode(filename, format!("Page {} not present in original", page_number)))?;
        let size = document_dimensions(
            page.image.width(),
            page.image.height(),
            self.config.document_max_dimension,
            self.config.document_policy,
        );
        Ok(scale_to(&page.image, size))
    }
}
