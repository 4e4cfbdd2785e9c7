//! Snapshot image encoding
//!
//! Maps save-file extensions to image formats (and the pixel format the frame
//! has to be captured in), and encodes captured frames.

use std::io::Write;

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder as _};

use crate::capture::{CapturedFrame, PixelFormat};
use crate::config;

/// Image container written by a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Jxr,
}

impl ImageFormat {
    /// Format for a file extension such as `.png` (case-insensitive, dot optional).
    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpg),
            "jxr" => Some(ImageFormat::Jxr),
            _ => None,
        }
    }

    /// Pixel format the frame must be captured in for this container.
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            ImageFormat::Png | ImageFormat::Jpg => PixelFormat::Bgra8,
            ImageFormat::Jxr => PixelFormat::Rgba16Float,
        }
    }
}

/// Writes an encoded image of a frame
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, frame: &CapturedFrame, out: &mut dyn Write, format: ImageFormat) -> Result<()>;
}

/// Portable PNG and JPG encoding through the `image` crate.
///
/// JPEG XR has no encoder here; asking for it is an error. The Windows
/// backend provides an encoder covering all three formats.
pub struct StandardImageEncoder {
    jpeg_quality: u8,
}

impl Default for StandardImageEncoder {
    fn default() -> Self {
        Self {
            jpeg_quality: config::snapshot::JPEG_QUALITY,
        }
    }
}

impl StandardImageEncoder {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

impl ImageEncoder for StandardImageEncoder {
    fn encode(&self, frame: &CapturedFrame, out: &mut dyn Write, format: ImageFormat) -> Result<()> {
        if frame.pixel_format != PixelFormat::Bgra8 && format != ImageFormat::Jxr {
            bail!(
                "{:?} snapshots need {} frames, got {}",
                format,
                PixelFormat::Bgra8,
                frame.pixel_format
            );
        }

        match format {
            ImageFormat::Png => {
                let rgba = bgra_to_rgba(frame);
                PngEncoder::new(out)
                    .write_image(&rgba, frame.width, frame.height, ExtendedColorType::Rgba8)
                    .context("PNG encoding failed")?;
            }
            ImageFormat::Jpg => {
                let rgb = bgra_to_rgb(frame);
                JpegEncoder::new_with_quality(out, self.jpeg_quality)
                    .write_image(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
                    .context("JPG encoding failed")?;
            }
            ImageFormat::Jxr => bail!("JPEG XR encoding is not supported by this encoder"),
        }

        log::debug!(
            "[Encoder] Wrote {:?} snapshot {}x{}",
            format,
            frame.width,
            frame.height
        );
        Ok(())
    }
}

/// Pixel bytes with stride padding removed.
pub fn packed_pixels(frame: &CapturedFrame) -> Vec<u8> {
    let row_bytes = (frame.width * frame.pixel_format.bytes_per_pixel()) as usize;
    let mut data = Vec::with_capacity(row_bytes * frame.height as usize);
    for row in frame.packed_rows() {
        data.extend_from_slice(row);
    }
    data
}

/// Convert an `Rgba16Float` frame to 16-bit unsigned normalized RGBA.
///
/// Channels are clamped to `[0, 1]`; output is little-endian and packed.
pub fn rgba16_float_to_unorm(frame: &CapturedFrame) -> Vec<u8> {
    let mut data = Vec::with_capacity((frame.width * frame.height * 8) as usize);
    for row in frame.packed_rows() {
        for channel in row.chunks_exact(2) {
            let value = half_to_f32(u16::from_le_bytes([channel[0], channel[1]]));
            let unorm = (value.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
            data.extend_from_slice(&unorm.to_le_bytes());
        }
    }
    data
}

/// IEEE 754 binary16 to f32. NaN maps to 0.
fn half_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let mantissa = (bits & 0x3FF) as f32;
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1F if mantissa == 0.0 => sign * f32::INFINITY,
        0x1F => 0.0,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}

fn bgra_to_rgba(frame: &CapturedFrame) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((frame.width * frame.height * 4) as usize);
    for row in frame.packed_rows() {
        for px in row.chunks_exact(4) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    rgba
}

fn bgra_to_rgb(frame: &CapturedFrame) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((frame.width * frame.height * 3) as usize);
    for row in frame.packed_rows() {
        for px in row.chunks_exact(4) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    }
    rgb
}
