use mime::Mime;

use crate::domains::transcode::types::file_extension;

/// MIME type for a stored or exported file, guessed from its name.
pub fn content_type_for(filename: &str) -> Mime {
    let lower = filename.to_lowercase();
    if lower.ends_with(".tar.gz") {
        return "application/gzip".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM);
    }

    let guessed = match file_extension(&lower).as_deref() {
        Some("jpg") | Some("jpeg") => return mime::IMAGE_JPEG,
        Some("png") => return mime::IMAGE_PNG,
        Some("gif") => return mime::IMAGE_GIF,
        Some("bmp") => return mime::IMAGE_BMP,
        Some("pdf") => return mime::APPLICATION_PDF,
        Some("csv") => return mime::TEXT_CSV,
        Some("avif") => "image/avif",
        Some("webp") => "image/webp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("zip") => "application/zip",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    guessed.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
