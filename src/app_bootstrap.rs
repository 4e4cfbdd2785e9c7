use capture_sample::logging;

use crate::settings::Settings;
use crate::settings_io;

/// Load settings early to get log level configuration.
pub(crate) fn load_initial_settings() -> Settings {
    match settings_io::app_config_dir() {
        Some(dir) => settings_io::load_settings_from_disk(&dir),
        None => Settings::default(),
    }
}

/// Initialize logging; `level_override` comes from the command line.
pub(crate) fn init_logging(settings: &Settings, level_override: Option<&str>) {
    let requested = level_override.unwrap_or(&settings.log_level);
    let log_level = requested.parse::<logging::LogLevel>().unwrap_or_else(|e| {
        eprintln!("{} (using Info)", e);
        logging::LogLevel::Info
    });

    if let Err(e) = logging::init_logging(log_level, settings.log_to_file) {
        eprintln!("Failed to initialize logging: {:#}", e);
    } else {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            platform = std::env::consts::OS,
            log_level = %log_level,
            "Capture sample started"
        );
        tracing::debug!(
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "Platform details"
        );
    }

    if settings.log_to_file {
        logging::auto_cleanup_old_logs(settings.log_retention_days);
    }
}

/// Log panics before the default hook prints them.
pub(crate) fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(?panic_info, "Application panic detected");
        default_panic(panic_info);
    }));
}

/// Log active settings for debugging.
pub(crate) fn log_active_settings(settings: &Settings) {
    tracing::debug!(
        pixel_format = %settings.pixel_format,
        cursor_enabled = settings.cursor_enabled,
        border_required = settings.border_required,
        snapshot_dir = ?settings.snapshot_dir,
        log_level = ?settings.log_level,
        log_to_file = settings.log_to_file,
        log_retention_days = settings.log_retention_days,
        "Settings configuration"
    );
}
