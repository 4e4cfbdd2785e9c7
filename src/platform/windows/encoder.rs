// platform/windows/encoder.rs - Snapshot encoding with Windows.Graphics.Imaging
//
// BitmapEncoder writes into an in-memory stream; the encoded bytes are then
// copied out to the caller's writer.

use std::io::Write;

use anyhow::{Context, Result};
use log::debug;
use windows::core::GUID;
use windows::Graphics::Imaging::{BitmapAlphaMode, BitmapEncoder, BitmapPixelFormat};
use windows::Storage::Streams::{DataReader, InMemoryRandomAccessStream};

use crate::capture::{CapturedFrame, PixelFormat};
use crate::encoder::{packed_pixels, rgba16_float_to_unorm, ImageEncoder, ImageFormat};

const SNAPSHOT_DPI: f64 = 96.0;

fn encoder_id(format: ImageFormat) -> Result<GUID> {
    let id = match format {
        ImageFormat::Png => BitmapEncoder::PngEncoderId()?,
        ImageFormat::Jpg => BitmapEncoder::JpegEncoderId()?,
        ImageFormat::Jxr => BitmapEncoder::JpegXREncoderId()?,
    };
    Ok(id)
}

/// PNG, JPG and JPEG XR through the system codecs
pub struct BitmapImageEncoder;

impl ImageEncoder for BitmapImageEncoder {
    fn encode(&self, frame: &CapturedFrame, out: &mut dyn Write, format: ImageFormat) -> Result<()> {
        let (pixel_format, pixels) = match frame.pixel_format {
            PixelFormat::Bgra8 => (BitmapPixelFormat::Bgra8, packed_pixels(frame)),
            PixelFormat::Rgba16Float => (BitmapPixelFormat::Rgba16, rgba16_float_to_unorm(frame)),
        };
        let alpha_mode = match format {
            ImageFormat::Jpg => BitmapAlphaMode::Ignore,
            ImageFormat::Png | ImageFormat::Jxr => BitmapAlphaMode::Premultiplied,
        };

        let stream = InMemoryRandomAccessStream::new()?;
        let encoder = BitmapEncoder::CreateAsync(encoder_id(format)?, &stream)?
            .get()
            .with_context(|| format!("Failed to create {:?} bitmap encoder", format))?;
        encoder.SetPixelData(
            pixel_format,
            alpha_mode,
            frame.width,
            frame.height,
            SNAPSHOT_DPI,
            SNAPSHOT_DPI,
            &pixels,
        )?;
        encoder
            .FlushAsync()?
            .get()
            .with_context(|| format!("{:?} encoding failed", format))?;

        let size = u32::try_from(stream.Size()?).context("Encoded snapshot exceeds 4 GiB")?;
        let reader = DataReader::CreateDataReader(&stream.GetInputStreamAt(0)?)?;
        reader.LoadAsync(size)?.get()?;
        let mut encoded = vec![0u8; size as usize];
        reader.ReadBytes(&mut encoded)?;
        out.write_all(&encoded)?;

        debug!(
            "[Encoder] Wrote {:?} snapshot {}x{} ({} bytes)",
            format, frame.width, frame.height, size
        );
        Ok(())
    }
}
