use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use capture_sample::capture::PixelFormat;
use capture_sample::config;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    // Capture
    #[serde(default)]
    pub pixel_format: PixelFormat,
    #[serde(default = "default_cursor_enabled")]
    pub cursor_enabled: bool,
    #[serde(default = "default_border_required")]
    pub border_required: bool,

    // Snapshots
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: Option<PathBuf>,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String, // "Off", "Error", "Warn", "Info", "Debug", "Trace"
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

fn default_cursor_enabled() -> bool {
    true
}

fn default_border_required() -> bool {
    true
}

fn default_snapshot_dir() -> Option<PathBuf> {
    dirs::picture_dir()
}

fn default_log_level() -> String {
    config::logging::DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_to_file() -> bool {
    false
}

fn default_log_retention_days() -> u32 {
    config::logging::LOG_RETENTION_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::default(),
            cursor_enabled: default_cursor_enabled(),
            border_required: default_border_required(),
            snapshot_dir: default_snapshot_dir(),
            log_level: default_log_level(),
            log_to_file: default_log_to_file(),
            log_retention_days: default_log_retention_days(),
        }
    }
}
