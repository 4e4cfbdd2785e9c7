// capture/mod.rs - Capture Session Types
//
// Platform-neutral types shared by the capture orchestrator and the platform
// backends: capture items, pixel formats, frames, render surfaces, and the
// traits a backend implements to resolve items, run sessions and grab frames.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::monitors::MonitorHandle;
use crate::window_filter::WindowHandle;

/// Pixel layout of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    /// 8-bit BGRA, unsigned normalized (`B8G8R8A8UIntNormalized`)
    #[default]
    Bgra8,
    /// 16-bit float RGBA (`R16G16B16A16Float`), used for HDR snapshots
    Rgba16Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Bgra8 => 4,
            PixelFormat::Rgba16Float => 8,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Bgra8 => write!(f, "B8G8R8A8UIntNormalized"),
            PixelFormat::Rgba16Float => write!(f, "R16G16B16A16Float"),
        }
    }
}

/// What the user asked to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTarget {
    Window(WindowHandle),
    Monitor(MonitorHandle),
}

/// Opaque descriptor of one capture source.
///
/// Backends attach their native item (e.g. a `GraphicsCaptureItem`) as the
/// payload and read it back with [`CaptureItem::native`].
#[derive(Clone)]
pub struct CaptureItem {
    display_name: String,
    size: (u32, u32),
    target: Option<CaptureTarget>,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl CaptureItem {
    pub fn new(display_name: impl Into<String>, size: (u32, u32)) -> Self {
        Self {
            display_name: display_name.into(),
            size,
            target: None,
            native: None,
        }
    }

    pub fn with_target(mut self, target: CaptureTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_native<T: Any + Send + Sync>(mut self, native: T) -> Self {
        self.native = Some(Arc::new(native));
        self
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Size of the source in pixels when the item was created
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Originating window or monitor; `None` for picker results
    pub fn target(&self) -> Option<CaptureTarget> {
        self.target
    }

    pub fn native<T: Any>(&self) -> Option<&T> {
        self.native.as_deref().and_then(|n| n.downcast_ref::<T>())
    }
}

impl fmt::Debug for CaptureItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureItem")
            .field("display_name", &self.display_name)
            .field("size", &self.size)
            .field("target", &self.target)
            .field("has_native", &self.native.is_some())
            .finish()
    }
}

/// A captured frame copied to CPU memory
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
}

impl CapturedFrame {
    /// Tightly packed rows (stride padding removed).
    pub fn packed_rows(&self) -> impl Iterator<Item = &[u8]> {
        let row_bytes = (self.width * self.pixel_format.bytes_per_pixel()) as usize;
        let stride = (self.stride as usize).max(row_bytes);
        self.data
            .chunks(stride)
            .take(self.height as usize)
            .map(move |row| &row[..row_bytes.min(row.len())])
    }
}

#[derive(Default)]
struct SurfaceInner {
    latest: Mutex<Option<CapturedFrame>>,
    presented: AtomicU64,
}

/// Drawable target that receives streamed frames for display.
///
/// Cloning shares the same surface.
#[derive(Clone, Default)]
pub struct RenderSurface {
    inner: Arc<SurfaceInner>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the displayed frame.
    pub fn present(&self, frame: CapturedFrame) {
        if let Ok(mut latest) = self.inner.latest.lock() {
            *latest = Some(frame);
        }
        self.inner.presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn latest_frame(&self) -> Option<CapturedFrame> {
        self.inner.latest.lock().ok().and_then(|latest| latest.clone())
    }

    pub fn frames_presented(&self) -> u64 {
        self.inner.presented.load(Ordering::Relaxed)
    }

    pub fn same_surface(&self, other: &RenderSurface) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSurface")
            .field("frames_presented", &self.frames_presented())
            .finish()
    }
}

/// Turns OS handles into capture items
pub trait CaptureItemResolver: Send + Sync {
    fn item_for_window(&self, window: WindowHandle) -> Result<CaptureItem>;

    fn item_for_monitor(&self, monitor: MonitorHandle) -> Result<CaptureItem>;
}

/// A live capture of one item
pub trait CaptureSession: Send {
    fn item(&self) -> &CaptureItem;

    /// Begin streaming frames into the surface.
    fn start(&mut self) -> Result<()>;

    /// Stop streaming and release capture resources.
    fn close(&mut self);

    /// Surface this session presents into.
    fn create_surface(&mut self) -> Result<RenderSurface>;

    fn is_cursor_enabled(&self) -> bool;

    fn set_cursor_enabled(&mut self, enabled: bool) -> Result<()>;

    fn is_border_required(&self) -> bool;

    fn set_border_required(&mut self, required: bool) -> Result<()>;

    /// Switch the pixel format of subsequent frames.
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()>;
}

/// Builds sessions bound to the backend's graphics device
pub trait CaptureSessionFactory: Send + Sync {
    fn create_session(
        &self,
        item: CaptureItem,
        pixel_format: PixelFormat,
    ) -> Result<Box<dyn CaptureSession>>;
}

/// Captures exactly one frame of an item
#[async_trait]
pub trait FrameGrabber: Send + Sync {
    async fn grab_frame(&self, item: &CaptureItem, pixel_format: PixelFormat)
        -> Result<CapturedFrame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_payload_round_trips_by_type() {
        let item = CaptureItem::new("Notepad", (640, 480)).with_native(42u32);
        assert_eq!(item.native::<u32>(), Some(&42));
        assert!(item.native::<String>().is_none());
    }

    #[test]
    fn packed_rows_strip_stride_padding() {
        let frame = CapturedFrame {
            width: 1,
            height: 2,
            stride: 8,
            pixel_format: PixelFormat::Bgra8,
            data: vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0],
        };
        let rows: Vec<&[u8]> = frame.packed_rows().collect();
        assert_eq!(rows, vec![&[1, 2, 3, 4][..], &[5, 6, 7, 8][..]]);
    }

    #[test]
    fn surface_clones_share_presented_frames() {
        let surface = RenderSurface::new();
        let view = surface.clone();
        surface.present(CapturedFrame {
            width: 1,
            height: 1,
            stride: 4,
            pixel_format: PixelFormat::Bgra8,
            data: vec![0; 4],
        });
        assert_eq!(view.frames_presented(), 1);
        assert!(view.latest_frame().is_some());
        assert!(view.same_surface(&surface));
    }
}
