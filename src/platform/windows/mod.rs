//! Win32 / Windows.Graphics.Capture implementations of the platform seams

pub mod capture;
pub mod encoder;
pub mod monitors;
pub mod win_events;
pub mod window_probe;

use std::sync::Arc;

use anyhow::Result;
use windows::Win32::System::WinRT::{RoInitialize, RO_INIT_MULTITHREADED};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
};

use super::PlatformServices;
use capture::{D3DDevice, WgcFrameGrabber, WgcItemResolver, WgcSessionFactory};
use encoder::BitmapImageEncoder;
use monitors::Win32MonitorEnumerator;
use win_events::Win32EventSource;
use window_probe::Win32WindowProbe;

pub fn create_services() -> Result<PlatformServices> {
    if let Err(e) = unsafe { RoInitialize(RO_INIT_MULTITHREADED) } {
        // Already initialized with another apartment type; WGC still works.
        log::debug!("[Platform] RoInitialize: {:?}", e);
    }

    let device = D3DDevice::create()?;
    Ok(PlatformServices {
        probe: Arc::new(Win32WindowProbe),
        events: Box::new(Win32EventSource),
        resolver: Arc::new(WgcItemResolver),
        sessions: Arc::new(WgcSessionFactory::new(Arc::clone(&device))),
        grabber: Arc::new(WgcFrameGrabber::new(device)),
        monitors: Arc::new(Win32MonitorEnumerator),
        encoder: Arc::new(BitmapImageEncoder),
    })
}

/// Dispatch every queued message of the calling thread without blocking.
pub fn pump_messages() {
    let mut msg = MSG::default();
    unsafe {
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}
