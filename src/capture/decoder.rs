use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::PixelFormat;
use crate::{CameraError, Result};

/// Decoded pixels plus the layout they ended up in
pub struct Decoded {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Turn a raw V4L2 buffer into `Mono8` or `Rgb24` pixels
pub fn decode_frame(data: &[u8], format: PixelFormat, width: u32, height: u32) -> Result<Decoded> {
    match format {
        PixelFormat::Mjpeg => {
            let mut decoder = Decoder::new(data);
            let pixels = decoder
                .decode()
                .map_err(|e| CameraError::Sdk(format!("MJPEG decode failed: {}", e)))?;
            let info = decoder
                .info()
                .ok_or(CameraError::FrameLayout { width, height })?;
            let format = match info.pixel_format {
                JpegPixelFormat::L8 => PixelFormat::Mono8,
                JpegPixelFormat::RGB24 => PixelFormat::Rgb24,
                other => {
                    return Err(CameraError::Sdk(format!(
                        "unsupported MJPEG pixel format {:?}",
                        other
                    )))
                }
            };
            Ok(Decoded {
                pixels,
                width: info.width as u32,
                height: info.height as u32,
                format,
            })
        }
        PixelFormat::Yuyv4 => Ok(Decoded {
            pixels: yuyv_to_rgb(data, width, height)?,
            width,
            height,
            format: PixelFormat::Rgb24,
        }),
        PixelFormat::Mono8 | PixelFormat::Rgb24 => {
            let bpp = format.bytes_per_pixel().unwrap_or(1);
            let expected = (width * height * bpp) as usize;
            if data.len() < expected {
                return Err(CameraError::FrameLayout { width, height });
            }
            Ok(Decoded {
                pixels: data[..expected].to_vec(),
                width,
                height,
                format,
            })
        }
    }
}

/// BT.601 YUYV (4:2:2) to packed RGB24
fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = (width * height) as usize;
    if data.len() < pixels * 2 || width % 2 != 0 {
        return Err(CameraError::FrameLayout { width, height });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |x: i32| x.clamp(0, 255) as u8;
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
    ]
}
