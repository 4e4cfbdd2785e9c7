//! Platform Abstraction Layer
//!
//! Bundles the OS-backed implementations of the registry and capture seams.
//! Only Windows has a capture backend; other platforms report an error.

#[cfg(windows)]
pub mod windows;

use std::sync::Arc;

use anyhow::Result;

use crate::capture::{CaptureItemResolver, CaptureSessionFactory, FrameGrabber};
use crate::encoder::ImageEncoder;
use crate::monitors::MonitorEnumerator;
use crate::window_events::WindowEventSource;
use crate::window_filter::WindowProbe;

/// Everything the OS provides
pub struct PlatformServices {
    pub probe: Arc<dyn WindowProbe>,
    /// Bound to the creating thread on Windows
    pub events: Box<dyn WindowEventSource>,
    pub resolver: Arc<dyn CaptureItemResolver>,
    pub sessions: Arc<dyn CaptureSessionFactory>,
    pub grabber: Arc<dyn FrameGrabber>,
    pub monitors: Arc<dyn MonitorEnumerator>,
    /// Snapshot encoder covering every [`crate::encoder::ImageFormat`]
    pub encoder: Arc<dyn ImageEncoder>,
}

/// Create the platform services on the calling (owner) thread.
pub fn create_services() -> Result<PlatformServices> {
    #[cfg(windows)]
    {
        self::windows::create_services()
    }
    #[cfg(not(windows))]
    {
        anyhow::bail!(
            "Window capture needs Windows.Graphics.Capture, which is not available on {}",
            std::env::consts::OS
        )
    }
}

/// Dispatch pending OS messages for the calling thread (no-op off Windows).
pub fn pump_messages() {
    #[cfg(windows)]
    self::windows::pump_messages();
}
