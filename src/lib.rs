//! Capture Sample - window registry and capture orchestration
//!
//! The library keeps a live list of capturable top-level windows and drives
//! capture sessions, snapshots and their UI collaborators through trait seams.
//! The Windows.Graphics.Capture backend lives in [`platform`].

// Configuration constants
pub mod config;

// Capturability rules and the live window list
pub mod window_events;
pub mod window_filter;
pub mod window_list;

pub mod capture;
pub mod monitors;

// Snapshot encoding
pub mod encoder;

// Orchestration
pub mod capture_controller;
pub mod capture_deps;
pub mod dispatcher;

pub mod logging;
pub mod platform;

// Re-export commonly used types
pub use capture::{CaptureItem, CapturedFrame, PixelFormat, RenderSurface};
pub use capture_controller::CaptureApp;
pub use window_filter::{WindowHandle, WindowInfo};
pub use window_list::WindowList;
