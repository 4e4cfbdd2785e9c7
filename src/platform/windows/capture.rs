// platform/windows/capture.rs - Windows Graphics Capture backend
//
// Capture items come from IGraphicsCaptureItemInterop, sessions run on
// free-threaded frame pools bound to one shared D3D11 device. Frames are
// polled with TryGetNextFrame and copied to CPU memory through a staging
// texture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use windows::core::Interface;
use windows::Graphics::Capture::{
    Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureAccess,
    GraphicsCaptureAccessKind, GraphicsCaptureItem, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Security::Authorization::AppCapabilityAccess::AppCapabilityAccessStatus;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::Graphics::Gdi::HMONITOR;
use windows::Win32::System::WinRT::Direct3D11::{
    CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
};
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

use super::window_probe::to_hwnd;
use crate::capture::{
    CaptureItem, CaptureItemResolver, CaptureSession, CaptureSessionFactory, CaptureTarget,
    CapturedFrame, FrameGrabber, PixelFormat, RenderSurface,
};
use crate::config;
use crate::monitors::MonitorHandle;
use crate::window_filter::WindowHandle;

fn directx_format(format: PixelFormat) -> DirectXPixelFormat {
    match format {
        PixelFormat::Bgra8 => DirectXPixelFormat::B8G8R8A8UIntNormalized,
        PixelFormat::Rgba16Float => DirectXPixelFormat::R16G16B16A16Float,
    }
}

fn poll_interval() -> Duration {
    Duration::from_millis(config::timing::FRAME_POLL_INTERVAL_MS)
}

/// The `GraphicsCaptureItem` behind a [`CaptureItem`]
#[derive(Clone)]
pub struct NativeCaptureItem(pub GraphicsCaptureItem);

// SAFETY: GraphicsCaptureItem is an agile WinRT object
unsafe impl Send for NativeCaptureItem {}
unsafe impl Sync for NativeCaptureItem {}

fn native_item(item: &CaptureItem) -> Result<GraphicsCaptureItem> {
    item.native::<NativeCaptureItem>()
        .map(|native| native.0.clone())
        .ok_or_else(|| anyhow!("Capture item {:?} has no graphics capture item", item.display_name()))
}

fn wrap_item(native: GraphicsCaptureItem, target: CaptureTarget) -> Result<CaptureItem> {
    let size = native.Size()?;
    let name = native.DisplayName()?.to_string();
    Ok(CaptureItem::new(name, (size.Width.max(0) as u32, size.Height.max(0) as u32))
        .with_target(target)
        .with_native(NativeCaptureItem(native)))
}

/// D3D11 device shared by every session and snapshot
pub struct D3DDevice {
    device: ID3D11Device,
    context: Mutex<ID3D11DeviceContext>,
    direct3d: IDirect3DDevice,
}

// SAFETY: the D3D11 device is free-threaded; the immediate context is only
// used under its mutex
unsafe impl Send for D3DDevice {}
unsafe impl Sync for D3DDevice {}

impl D3DDevice {
    pub fn create() -> Result<Arc<Self>> {
        let mut device = None;
        let mut context = None;

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                windows::Win32::Foundation::HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .context("D3D11CreateDevice failed")?;
        }

        let device: ID3D11Device = device.ok_or_else(|| anyhow!("Device creation returned null"))?;
        let context = context.ok_or_else(|| anyhow!("Context creation returned null"))?;

        let dxgi_device: IDXGIDevice = device
            .cast()
            .context("Failed to cast ID3D11Device to IDXGIDevice")?;
        let direct3d: IDirect3DDevice = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device) }
            .context("CreateDirect3D11DeviceFromDXGIDevice failed")?
            .cast()?;

        info!("[WGC] Created D3D11 device");
        Ok(Arc::new(Self {
            device,
            context: Mutex::new(context),
            direct3d,
        }))
    }

    fn read_frame(&self, frame: &Direct3D11CaptureFrame) -> Result<CapturedFrame> {
        let surface = frame.Surface()?;
        let access: IDirect3DDxgiInterfaceAccess = surface.cast()?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface() }?;
        self.copy_to_cpu(&texture)
    }

    /// Copy a GPU texture into CPU memory, stride padding removed.
    fn copy_to_cpu(&self, texture: &ID3D11Texture2D) -> Result<CapturedFrame> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };

        let pixel_format = if desc.Format == DXGI_FORMAT_B8G8R8A8_UNORM {
            PixelFormat::Bgra8
        } else if desc.Format == DXGI_FORMAT_R16G16B16A16_FLOAT {
            PixelFormat::Rgba16Float
        } else {
            bail!("Unexpected capture texture format {:?}", desc.Format);
        };

        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.Width,
            Height: desc.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: desc.Format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut staging = None;
        unsafe {
            self.device
                .CreateTexture2D(&staging_desc, None, Some(&mut staging))
                .context("Failed to create staging texture")?;
        }
        let staging = staging.ok_or_else(|| anyhow!("Staging texture creation returned null"))?;

        let context = self
            .context
            .lock()
            .map_err(|_| anyhow!("D3D11 context lock poisoned"))?;

        unsafe { context.CopyResource(&staging, texture) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            context
                .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .context("Failed to map staging texture")?;
        }

        let stride = mapped.RowPitch as usize;
        let row_bytes = (desc.Width * pixel_format.bytes_per_pixel()) as usize;
        let mut data = vec![0u8; row_bytes * desc.Height as usize];

        unsafe {
            let src_ptr = mapped.pData as *const u8;
            for row in 0..desc.Height as usize {
                let src_row = src_ptr.add(row * stride);
                let dst_row = data.as_mut_ptr().add(row * row_bytes);
                std::ptr::copy_nonoverlapping(src_row, dst_row, row_bytes);
            }
            context.Unmap(&staging, 0);
        }

        Ok(CapturedFrame {
            width: desc.Width,
            height: desc.Height,
            stride: row_bytes as u32,
            pixel_format,
            data,
        })
    }
}

/// Creates capture items through `IGraphicsCaptureItemInterop`
pub struct WgcItemResolver;

impl CaptureItemResolver for WgcItemResolver {
    fn item_for_window(&self, window: WindowHandle) -> Result<CaptureItem> {
        let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;
        let native: GraphicsCaptureItem = unsafe { interop.CreateForWindow(to_hwnd(window)) }
            .with_context(|| format!("CreateForWindow failed for {}", window))?;
        wrap_item(native, CaptureTarget::Window(window))
    }

    fn item_for_monitor(&self, monitor: MonitorHandle) -> Result<CaptureItem> {
        let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;
        let hmonitor = HMONITOR(monitor.0 as *mut std::ffi::c_void);
        let native: GraphicsCaptureItem = unsafe { interop.CreateForMonitor(hmonitor) }
            .with_context(|| format!("CreateForMonitor failed for {}", monitor))?;
        wrap_item(native, CaptureTarget::Monitor(monitor))
    }
}

struct FramePump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FramePump {
    fn spawn(frame_pool: Direct3D11CaptureFramePool, device: Arc<D3DDevice>, surface: RenderSurface) -> Self {
        struct PoolHandle(Direct3D11CaptureFramePool);
        // SAFETY: the pool is created free-threaded
        unsafe impl Send for PoolHandle {}

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let pool = PoolHandle(frame_pool);

        let handle = std::thread::spawn(move || {
            let pool = pool;
            while !stop_flag.load(Ordering::Relaxed) {
                if let Ok(frame) = pool.0.TryGetNextFrame() {
                    match device.read_frame(&frame) {
                        Ok(cpu_frame) => surface.present(cpu_frame),
                        Err(e) => warn!("[WGC] Dropped frame: {:#}", e),
                    }
                    let _ = frame.Close();
                }
                std::thread::sleep(poll_interval());
            }
            debug!("[WGC] Frame pump exited");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A live capture streaming into a [`RenderSurface`]
pub struct WgcSession {
    item: CaptureItem,
    native: GraphicsCaptureItem,
    device: Arc<D3DDevice>,
    frame_pool: Direct3D11CaptureFramePool,
    session: GraphicsCaptureSession,
    pixel_format: PixelFormat,
    surface: RenderSurface,
    pump: Option<FramePump>,
    closed: bool,
}

// SAFETY: the frame pool is free-threaded and the session is agile
unsafe impl Send for WgcSession {}

impl WgcSession {
    fn new(device: Arc<D3DDevice>, item: CaptureItem, pixel_format: PixelFormat) -> Result<Self> {
        let native = native_item(&item)?;
        let size = native.Size()?;

        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            &device.direct3d,
            directx_format(pixel_format),
            config::capture::FRAME_POOL_BUFFERS,
            size,
        )
        .context("Failed to create frame pool")?;
        let session = frame_pool
            .CreateCaptureSession(&native)
            .context("CreateCaptureSession failed")?;

        info!(
            "[WGC] Session for {:?} ({}x{}, {})",
            item.display_name(),
            size.Width,
            size.Height,
            pixel_format
        );

        Ok(Self {
            item,
            native,
            device,
            frame_pool,
            session,
            pixel_format,
            surface: RenderSurface::new(),
            pump: None,
            closed: false,
        })
    }
}

impl CaptureSession for WgcSession {
    fn item(&self) -> &CaptureItem {
        &self.item
    }

    fn start(&mut self) -> Result<()> {
        if self.closed {
            bail!("Capture session is closed");
        }
        self.session.StartCapture().context("StartCapture failed")?;
        self.pump = Some(FramePump::spawn(
            self.frame_pool.clone(),
            Arc::clone(&self.device),
            self.surface.clone(),
        ));
        info!("[WGC] Capture started");
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut pump) = self.pump.take() {
            pump.stop();
        }
        let _ = self.session.Close();
        let _ = self.frame_pool.Close();
        info!("[WGC] Capture closed");
    }

    fn create_surface(&mut self) -> Result<RenderSurface> {
        Ok(self.surface.clone())
    }

    fn is_cursor_enabled(&self) -> bool {
        self.session.IsCursorCaptureEnabled().unwrap_or(false)
    }

    fn set_cursor_enabled(&mut self, enabled: bool) -> Result<()> {
        self.session
            .SetIsCursorCaptureEnabled(enabled)
            .context("SetIsCursorCaptureEnabled failed")?;
        Ok(())
    }

    fn is_border_required(&self) -> bool {
        self.session.IsBorderRequired().unwrap_or(true)
    }

    fn set_border_required(&mut self, required: bool) -> Result<()> {
        let status = GraphicsCaptureAccess::RequestAccessAsync(GraphicsCaptureAccessKind::Borderless)?
            .get()
            .context("Borderless capture access request failed")?;
        if status != AppCapabilityAccessStatus::Allowed {
            warn!("[WGC] Borderless capture access: {:?}", status);
        }
        self.session
            .SetIsBorderRequired(required)
            .context("SetIsBorderRequired failed")?;
        Ok(())
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        if format == self.pixel_format || self.closed {
            self.pixel_format = format;
            return Ok(());
        }
        self.frame_pool
            .Recreate(
                &self.device.direct3d,
                directx_format(format),
                config::capture::FRAME_POOL_BUFFERS,
                self.native.Size()?,
            )
            .context("Failed to recreate frame pool")?;
        self.pixel_format = format;
        info!("[WGC] Frame pool recreated as {}", format);
        Ok(())
    }
}

impl Drop for WgcSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds [`WgcSession`]s on the shared device
pub struct WgcSessionFactory {
    device: Arc<D3DDevice>,
}

impl WgcSessionFactory {
    pub fn new(device: Arc<D3DDevice>) -> Self {
        Self { device }
    }
}

impl CaptureSessionFactory for WgcSessionFactory {
    fn create_session(
        &self,
        item: CaptureItem,
        pixel_format: PixelFormat,
    ) -> Result<Box<dyn CaptureSession>> {
        Ok(Box::new(WgcSession::new(Arc::clone(&self.device), item, pixel_format)?))
    }
}

/// Short-lived pool and session used for a single frame
struct OneShotCapture {
    frame_pool: Direct3D11CaptureFramePool,
    session: GraphicsCaptureSession,
}

// SAFETY: free-threaded pool, agile session
unsafe impl Send for OneShotCapture {}

impl OneShotCapture {
    fn start(device: &D3DDevice, item: &CaptureItem, pixel_format: PixelFormat) -> Result<Self> {
        let native = native_item(item)?;
        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            &device.direct3d,
            directx_format(pixel_format),
            1,
            native.Size()?,
        )?;
        let session = frame_pool.CreateCaptureSession(&native)?;
        session.StartCapture().context("StartCapture failed")?;
        Ok(Self { frame_pool, session })
    }
}

impl Drop for OneShotCapture {
    fn drop(&mut self) {
        let _ = self.session.Close();
        let _ = self.frame_pool.Close();
    }
}

/// Grabs one frame with a dedicated one-shot session
pub struct WgcFrameGrabber {
    device: Arc<D3DDevice>,
}

impl WgcFrameGrabber {
    pub fn new(device: Arc<D3DDevice>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl FrameGrabber for WgcFrameGrabber {
    async fn grab_frame(&self, item: &CaptureItem, pixel_format: PixelFormat) -> Result<CapturedFrame> {
        let capture = OneShotCapture::start(&self.device, item, pixel_format)?;
        debug!("[WGC] Waiting for snapshot frame of {:?}", item.display_name());

        loop {
            if let Ok(frame) = capture.frame_pool.TryGetNextFrame() {
                let cpu_frame = self.device.read_frame(&frame);
                let _ = frame.Close();
                return cpu_frame;
            }
            tokio::time::sleep(poll_interval()).await;
        }
    }
}
