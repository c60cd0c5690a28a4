pub mod encoder;
pub mod rasterizer;
pub mod scaling;
pub mod service;
pub mod types;

pub use rasterizer::{GhostscriptRasterizer, PdfRasterizer};
pub use service::DocumentTranscoder;
pub use types::{MediaKind, OutputCodec, RasterPage, ScalePolicy, TranscodeConfig, TranscodedPage, UploadedFile};
