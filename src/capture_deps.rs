//! Collaborators of the capture orchestrator that belong to the UI layer:
//! pickers, dialogs and the display brush.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::capture::{CaptureItem, CaptureItemResolver, CaptureSessionFactory, FrameGrabber, RenderSurface};
use crate::config;
use crate::dispatcher::OwnerDispatcher;
use crate::encoder::ImageEncoder;

/// What the save picker should suggest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFileRequest {
    pub start_location: Option<PathBuf>,
    pub suggested_file_name: String,
    pub default_extension: String,
    /// (label, extensions) pairs, e.g. ("PNG image", [".png"])
    pub file_type_choices: Vec<(String, Vec<String>)>,
}

impl SaveFileRequest {
    /// The snapshot prompt: `snapshot.png` with PNG/JPG/JXR choices.
    pub fn snapshot(start_location: Option<PathBuf>) -> Self {
        Self {
            start_location,
            suggested_file_name: config::snapshot::SUGGESTED_FILE_NAME.to_string(),
            default_extension: config::snapshot::DEFAULT_EXTENSION.to_string(),
            file_type_choices: config::snapshot::FILE_TYPE_CHOICES
                .iter()
                .map(|(label, exts)| {
                    (
                        label.to_string(),
                        exts.iter().map(|e| e.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Full path the picker should pre-fill.
    pub fn suggested_path(&self) -> PathBuf {
        let file_name = format!("{}{}", self.suggested_file_name, self.default_extension);
        match &self.start_location {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

/// A destination chosen in the save picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFile {
    path: PathBuf,
}

impl SaveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved extension including the dot (e.g. `.png`); empty if none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default()
    }

    /// Replace the file's contents with `bytes`, creating it if needed.
    pub fn write_contents(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open snapshot file: {:?}", self.path))?;
        let mut out = BufWriter::new(file);
        out.write_all(bytes)
            .and_then(|_| out.flush())
            .with_context(|| format!("Failed to write snapshot: {:?}", self.path))?;
        Ok(())
    }
}

/// System picker for a capture target
#[async_trait]
pub trait TargetPicker: Send + Sync {
    /// `None` when the user cancels.
    async fn pick_target(&self) -> Result<Option<CaptureItem>>;
}

/// Save-location picker
#[async_trait]
pub trait SaveFilePicker: Send + Sync {
    /// `None` when the user cancels.
    async fn pick_save_file(&self, request: &SaveFileRequest) -> Result<Option<SaveFile>>;
}

/// User-visible notification
#[async_trait]
pub trait MessageDialog: Send + Sync {
    async fn show_message(&self, message: &str) -> Result<()>;
}

/// The display brush a session's surface is attached to
pub trait RenderTarget: Send + Sync {
    /// Attach `surface`, or detach with `None`.
    fn set_surface(&self, surface: Option<RenderSurface>) -> Result<()>;
}

/// Everything [`crate::capture_controller::CaptureApp`] talks to.
#[derive(Clone)]
pub struct CaptureDeps {
    pub resolver: Arc<dyn CaptureItemResolver>,
    pub sessions: Arc<dyn CaptureSessionFactory>,
    pub grabber: Arc<dyn FrameGrabber>,
    pub encoder: Arc<dyn ImageEncoder>,
    pub render_target: Arc<dyn RenderTarget>,
    pub target_picker: Arc<dyn TargetPicker>,
    pub save_picker: Arc<dyn SaveFilePicker>,
    pub dialogs: Arc<dyn MessageDialog>,
    pub owner: Arc<dyn OwnerDispatcher>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_request_suggests_png_in_start_location() {
        let request = SaveFileRequest::snapshot(Some(PathBuf::from("pictures")));
        assert_eq!(request.suggested_path(), PathBuf::from("pictures").join("snapshot.png"));
        assert_eq!(request.file_type_choices.len(), 3);
        assert_eq!(request.file_type_choices[2].1, vec![".jxr".to_string()]);
    }

    #[test]
    fn save_file_extension_keeps_the_dot() {
        assert_eq!(SaveFile::new("out/shot.JXR").extension(), ".JXR");
        assert_eq!(SaveFile::new("out/shot").extension(), "");
    }

    #[test]
    fn write_contents_creates_parents_and_replaces_old_bytes() {
        let dir = std::env::temp_dir().join(format!("capture_sample_save_{}", std::process::id()));
        let file = SaveFile::new(dir.join("nested").join("shot.png"));

        file.write_contents(b"first version").unwrap();
        file.write_contents(b"second").unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), b"second");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
