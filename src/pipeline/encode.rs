//! JPEG encoding of slot frames, with optional downscale for the live stream

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, ImageBuffer, Luma, Rgb};

use crate::capture::{Frame, PixelFormat};
use crate::{CameraError, Result};

/// Encode a frame at full resolution
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    encode_scaled(frame, quality, None)
}

/// Encode, first shrinking to `max_width` (aspect preserved) when the frame is wider
pub fn encode_scaled(frame: &Frame, quality: u8, max_width: Option<u32>) -> Result<Vec<u8>> {
    let (width, height) = (frame.width(), frame.height());
    let target = max_width
        .filter(|&max| max > 0 && width > max)
        .map(|max| (max, ((height as u64 * max as u64) / width as u64).max(1) as u32));

    match frame.format() {
        PixelFormat::Mono8 => {
            let view = ImageBuffer::<Luma<u8>, &[u8]>::from_raw(width, height, &frame.data[..])
                .ok_or(CameraError::FrameLayout { width, height })?;
            match target {
                Some((w, h)) => {
                    let small = imageops::thumbnail(&view, w, h);
                    write_jpeg(small.as_raw(), w, h, ExtendedColorType::L8, quality)
                }
                None => write_jpeg(view.as_raw(), width, height, ExtendedColorType::L8, quality),
            }
        }
        PixelFormat::Rgb24 => {
            let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, &frame.data[..])
                .ok_or(CameraError::FrameLayout { width, height })?;
            match target {
                Some((w, h)) => {
                    let small = imageops::thumbnail(&view, w, h);
                    write_jpeg(small.as_raw(), w, h, ExtendedColorType::Rgb8, quality)
                }
                None => write_jpeg(view.as_raw(), width, height, ExtendedColorType::Rgb8, quality),
            }
        }
        // Adapters decode before publishing
        PixelFormat::Yuyv4 | PixelFormat::Mjpeg => Err(CameraError::FrameLayout { width, height }),
    }
}

fn write_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    quality: u8,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(pixels.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        pixels,
        width,
        height,
        color,
    )?;
    Ok(out)
}
