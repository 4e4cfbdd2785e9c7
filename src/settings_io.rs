use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::settings::Settings;
use capture_sample::config;

pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(config::paths::APP_DIR_NAME))
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (k, v) in overlay_obj {
                match base_obj.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        base_obj.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

/// Rewrite hand-edited or legacy values into the current schema.
///
/// Values that cannot be understood are removed so defaults apply.
pub fn sanitize_settings_json(value: &mut Value) {
    let Value::Object(obj) = value else {
        return;
    };

    // pixel_format: accept lowercase and DirectX names
    if let Some(pf) = obj.get("pixel_format").and_then(|v| v.as_str()) {
        let normalized = match pf.to_ascii_lowercase().as_str() {
            "bgra8" | "b8g8r8a8uintnormalized" | "sdr" => Some("Bgra8"),
            "rgba16float" | "r16g16b16a16float" | "hdr" => Some("Rgba16Float"),
            _ => None,
        };
        match normalized {
            Some(pf) => {
                obj.insert("pixel_format".to_string(), Value::String(pf.to_string()));
            }
            None => {
                obj.remove("pixel_format");
            }
        }
    } else if obj.contains_key("pixel_format") {
        obj.remove("pixel_format");
    }

    // log_level: numeric 0 (Off) ..= 5 (Trace)
    if let Some(level) = obj.get("log_level").and_then(|v| v.as_u64()) {
        let names = ["Off", "Error", "Warn", "Info", "Debug", "Trace"];
        match names.get(level as usize) {
            Some(name) => {
                obj.insert("log_level".to_string(), Value::String(name.to_string()));
            }
            None => {
                obj.remove("log_level");
            }
        }
    }

    if obj.get("log_retention_days").and_then(|v| v.as_u64()) == Some(0) {
        obj.remove("log_retention_days");
    }

    if obj.get("snapshot_dir").and_then(|v| v.as_str()) == Some("") {
        obj.remove("snapshot_dir");
    }
}

/// Load settings from `dir`, normalizing the file on disk.
///
/// A missing or unreadable file yields defaults.
pub fn load_settings_from_disk(dir: &Path) -> Settings {
    let settings_path = dir.join(config::paths::SETTINGS_FILE_NAME);

    let raw = std::fs::read_to_string(&settings_path).unwrap_or_else(|_| "{}".to_string());
    let mut value: Value = serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed {:?}: {}", settings_path, e);
        serde_json::json!({})
    });

    sanitize_settings_json(&mut value);

    // Merge onto current defaults so missing keys don't break deserialization.
    let mut merged =
        serde_json::to_value(Settings::default()).unwrap_or_else(|_| serde_json::json!({}));
    merge_json(&mut merged, value);

    let settings: Settings = serde_json::from_value(merged).unwrap_or_default();

    if let Err(e) = persist_settings_to_disk(dir, &settings) {
        log::warn!("Failed to persist normalized settings: {:#}", e);
    }

    settings
}

/// Write `settings` to `dir`, keeping keys this version does not know.
pub fn persist_settings_to_disk(dir: &Path, settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
    let settings_path = dir.join(config::paths::SETTINGS_FILE_NAME);

    let mut existing_value: Value = match std::fs::read_to_string(&settings_path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !existing_value.is_object() {
        existing_value = serde_json::json!({});
    }

    let new_value = serde_json::to_value(settings).context("Failed to serialize settings")?;
    merge_json(&mut existing_value, new_value);

    let pretty = serde_json::to_string_pretty(&existing_value)?;
    std::fs::write(&settings_path, pretty)
        .with_context(|| format!("Failed to write {:?}", settings_path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_accepts_lowercase_and_directx_pixel_formats() {
        let mut value = json!({ "pixel_format": "r16g16b16a16float" });
        sanitize_settings_json(&mut value);
        assert_eq!(value["pixel_format"], json!("Rgba16Float"));

        let mut value = json!({ "pixel_format": "bgra8" });
        sanitize_settings_json(&mut value);
        assert_eq!(value["pixel_format"], json!("Bgra8"));
    }

    #[test]
    fn sanitize_removes_unknown_pixel_format() {
        let mut value = json!({ "pixel_format": "yuv420" });
        sanitize_settings_json(&mut value);
        assert!(value.get("pixel_format").is_none());
    }

    #[test]
    fn sanitize_maps_numeric_log_level() {
        let mut value = json!({ "log_level": 4 });
        sanitize_settings_json(&mut value);
        assert_eq!(value["log_level"], json!("Debug"));

        let mut value = json!({ "log_level": 9 });
        sanitize_settings_json(&mut value);
        assert!(value.get("log_level").is_none());
    }

    #[test]
    fn sanitize_drops_zero_retention() {
        let mut value = json!({ "log_retention_days": 0 });
        sanitize_settings_json(&mut value);
        assert!(value.get("log_retention_days").is_none());
    }
}
