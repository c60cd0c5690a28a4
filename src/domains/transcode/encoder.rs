//! Raster encoders for the configured output codecs.

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};

use super::types::OutputCodec;

/// Encode with the given lossy codec. Quality is clamped to 1..=100.
pub fn encode(image: &DynamicImage, codec: OutputCodec, quality: u8) -> Result<Vec<u8>, String> {
    let quality = quality.clamp(1, 100);
    match codec {
        OutputCodec::Avif => encode_avif(image, quality),
        OutputCodec::Webp => encode_webp(image, quality),
        OutputCodec::Jpeg => encode_jpeg(image, quality),
    }
}

/// Baseline JPEG; alpha is dropped.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let rgb = image.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| format!("JPEG encoding error: {}", e))?;
    Ok(output)
}

fn encode_avif(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let rgb_img = image.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    let rgb_data: Vec<rgb::RGB8> = rgb_img
        .as_raw()
        .chunks_exact(3)
        .map(|chunk| rgb::RGB8::new(chunk[0], chunk[1], chunk[2]))
        .collect();

    let img_buf = ravif::Img::new(rgb_data.as_slice(), width as usize, height as usize);

    let encoded = ravif::Encoder::new()
        .with_quality(quality as f32)
        .with_speed(6)
        .encode_rgb(img_buf)
        .map_err(|e| format!("AVIF encoding error: {}", e))?;

    Ok(encoded.avif_file)
}

#[cfg(feature = "webp")]
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let rgba = image.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
        .encode(quality as f32);
    Ok(encoded.to_vec())
}

#[cfg(not(feature = "webp"))]
fn encode_webp(_image: &DynamicImage, _quality: u8) -> Result<Vec<u8>, String> {
    Err("WebP output requires the `webp` feature".to_string())
}
