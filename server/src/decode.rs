//! SPDX-License-Identifier: GPL-3.0-or-later

//! Frame payload decoding: base64 to image, aspect-preserving downscale to
//! the configured target, then tightly packed BGR bytes for the pipeline.

use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine;
use bodytrack_pipeline::config::FrameSettings;
use bodytrack_pipeline::error::ErrorCode;
use image::imageops::FilterType;

#[derive(Debug, PartialEq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decodes a base64 image into BGR pixel bytes, scaled to fit the target
/// frame while preserving aspect ratio. Never upscales.
pub fn decode_frame(content_b64: &str, target: &FrameSettings) -> Result<DecodedFrame, ErrorCode> {
    let bytes = base64_engine
        .decode(content_b64.trim())
        .map_err(|_| ErrorCode::FrameDecodingFailed)?;
    let image = image::load_from_memory(&bytes).map_err(|_| ErrorCode::FrameDecodingFailed)?;

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ErrorCode::FrameDecodingFailed);
    }

    let scale = f64::min(
        target.width as f64 / width as f64,
        target.height as f64 / height as f64,
    )
    .min(1.0);
    let out_width = ((width as f64 * scale).round() as u32).max(1);
    let out_height = ((height as f64 * scale).round() as u32).max(1);

    let rgb = image
        .resize_exact(out_width, out_height, FilterType::Triangle)
        .to_rgb8();

    let mut pixels = rgb.into_raw();
    // The pipeline contract is BGR byte order.
    for chunk in pixels.chunks_exact_mut(3) {
        chunk.swap(0, 2);
    }

    Ok(DecodedFrame {
        width: out_width,
        height: out_height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> String {
        let mut image = RgbImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = image::Rgb([200, 100, 50]);
        }
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        base64_engine.encode(buffer.into_inner())
    }

    fn target() -> FrameSettings {
        FrameSettings {
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn downscales_preserving_aspect() {
        let content = encode_png(128, 128);
        let frame = decode_frame(&content, &target()).unwrap();
        // Limited by height: 48x48.
        assert_eq!((frame.width, frame.height), (48, 48));
        assert_eq!(frame.pixels.len(), 48 * 48 * 3);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let content = encode_png(10, 10);
        let frame = decode_frame(&content, &target()).unwrap();
        assert_eq!((frame.width, frame.height), (10, 10));
    }

    #[test]
    fn channels_are_swapped_to_bgr() {
        let content = encode_png(4, 4);
        let frame = decode_frame(&content, &target()).unwrap();
        // Source was RGB(200, 100, 50); BGR order puts blue first.
        assert_eq!(&frame.pixels[0..3], &[50, 100, 200]);
    }

    #[test]
    fn garbage_payload_fails_decoding() {
        assert_eq!(
            decode_frame("not base64!!!", &target()),
            Err(ErrorCode::FrameDecodingFailed)
        );
        let b64_garbage = base64_engine.encode(b"not an image");
        assert_eq!(
            decode_frame(&b64_garbage, &target()),
            Err(ErrorCode::FrameDecodingFailed)
        );
    }
}
