//! Application Configuration Constants
//!
//! Centralized configuration for the magic numbers, strings and defaults used by
//! the window registry, the capture orchestrator and the console front end.

/// Window registry configuration
pub mod windows {
    /// Exact window titles that are never offered for capture.
    ///
    /// "Task View" is a shell surface that passes every other capturability
    /// check but cannot be captured meaningfully.
    pub const EXCLUDED_WINDOW_TITLES: &[&str] = &["Task View"];

    /// Win32 `OBJID_WINDOW`
    pub const OBJID_WINDOW: i32 = 0;

    /// Win32 `CHILDID_SELF`
    pub const CHILDID_SELF: i32 = 0;

    /// Win32 `EVENT_OBJECT_DESTROY`
    pub const EVENT_OBJECT_DESTROY: u32 = 0x8001;

    /// Win32 `EVENT_OBJECT_SHOW`
    pub const EVENT_OBJECT_SHOW: u32 = 0x8002;

    /// Win32 `EVENT_OBJECT_UNCLOAKED` (last event of the hooked range)
    pub const EVENT_OBJECT_UNCLOAKED: u32 = 0x8018;

    /// `DWMWA_CLOAKED` value for windows cloaked by their own application
    pub const DWM_CLOAKED_APP: u32 = 0x0000_0001;
    /// `DWMWA_CLOAKED` value for windows cloaked by the shell
    pub const DWM_CLOAKED_SHELL: u32 = 0x0000_0002;
    /// `DWMWA_CLOAKED` value for windows cloaked through their owner
    pub const DWM_CLOAKED_INHERITED: u32 = 0x0000_0004;
}

/// Snapshot Configuration
pub mod snapshot {
    /// File name suggested by the save picker (without extension)
    pub const SUGGESTED_FILE_NAME: &str = "snapshot";

    /// Extension pre-selected by the save picker
    pub const DEFAULT_EXTENSION: &str = ".png";

    /// File type choices offered by the save picker: (label, extensions)
    pub const FILE_TYPE_CHOICES: &[(&str, &[&str])] = &[
        ("PNG image", &[".png"]),
        ("JPG image", &[".jpg"]),
        ("JXR image", &[".jxr"]),
    ];

    /// Message shown when the chosen file has an extension we cannot encode
    pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "Unsupported file format!";

    /// JPEG quality used by the standard encoder (1-100)
    pub const JPEG_QUALITY: u8 = 90;
}

/// Capture Session Configuration
pub mod capture {
    /// Number of buffers in a capture frame pool
    pub const FRAME_POOL_BUFFERS: i32 = 2;

    /// How long a one-shot frame grab waits for the first frame (milliseconds)
    pub const SNAPSHOT_TIMEOUT_MS: u64 = 5_000;
}

/// Logging defaults
pub mod logging {
    /// Level used when settings.json has none
    pub const DEFAULT_LOG_LEVEL: &str = "Info";

    /// Log files older than this many days are deleted at startup
    pub const LOG_RETENTION_DAYS: u32 = 14;
}

/// Owner thread configuration
pub mod timing {
    /// Poll interval of the owner thread loop (milliseconds)
    pub const OWNER_POLL_INTERVAL_MS: u64 = 10;

    /// How often a frame pool is polled for a new frame (milliseconds)
    pub const FRAME_POLL_INTERVAL_MS: u64 = 5;

    /// Interval between frame statistics reports in the console front end
    pub const SURFACE_REPORT_INTERVAL_MS: u64 = 1_000;
}

/// Directory and file names
pub mod paths {
    /// Per-user application directory name (config and logs)
    pub const APP_DIR_NAME: &str = "CaptureSample";

    /// Settings file name inside the config directory
    pub const SETTINGS_FILE_NAME: &str = "settings.json";

    /// Prefix of the rolling log files
    pub const LOG_FILE_PREFIX: &str = "capture-sample.log";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extension_is_offered_as_a_choice() {
        let offered = snapshot::FILE_TYPE_CHOICES
            .iter()
            .flat_map(|(_, exts)| exts.iter())
            .any(|ext| *ext == snapshot::DEFAULT_EXTENSION);
        assert!(offered);
    }

    #[test]
    fn hooked_event_range_covers_show() {
        assert!(windows::EVENT_OBJECT_DESTROY < windows::EVENT_OBJECT_SHOW);
        assert!(windows::EVENT_OBJECT_SHOW < windows::EVENT_OBJECT_UNCLOAKED);
    }
}
