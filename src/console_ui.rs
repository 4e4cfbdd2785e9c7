//! Console front end for the capture workflows
//!
//! Terminal stand-ins for the system pickers, the message dialog and the
//! display brush.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use capture_sample::capture::{CaptureItem, CaptureItemResolver, RenderSurface};
use capture_sample::capture_deps::{
    MessageDialog, RenderTarget, SaveFile, SaveFilePicker, SaveFileRequest, TargetPicker,
};
use capture_sample::monitors::{MonitorEnumerator, MonitorInfo};
use capture_sample::window_filter::WindowInfo;
use capture_sample::window_list::{WindowListObserver, WindowListReader};

/// Line input shared by every prompt
pub type SharedInput = Arc<Mutex<Box<dyn BufRead + Send>>>;

pub fn stdin_input() -> SharedInput {
    Arc::new(Mutex::new(Box::new(std::io::BufReader::new(std::io::stdin()))))
}

/// Print `prompt` and read one trimmed line off the runtime threads.
///
/// `None` on end of input.
async fn prompt_line(input: &SharedInput, prompt: String) -> Result<Option<String>> {
    let input = Arc::clone(input);
    tokio::task::spawn_blocking(move || -> Result<Option<String>> {
        eprint!("{}", prompt);
        let _ = std::io::stderr().flush();

        let mut reader = input.lock().map_err(|_| anyhow!("console input poisoned"))?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    })
    .await?
}

fn is_cancel(answer: &Option<String>) -> bool {
    match answer {
        None => true,
        Some(text) => text.eq_ignore_ascii_case("q"),
    }
}

enum PickerEntry {
    Window(WindowInfo),
    Monitor(MonitorInfo),
}

/// Numbered list of capturable windows and monitors
pub struct ConsoleTargetPicker {
    windows: WindowListReader,
    monitors: Arc<dyn MonitorEnumerator>,
    resolver: Arc<dyn CaptureItemResolver>,
    input: SharedInput,
}

impl ConsoleTargetPicker {
    pub fn new(
        windows: WindowListReader,
        monitors: Arc<dyn MonitorEnumerator>,
        resolver: Arc<dyn CaptureItemResolver>,
        input: SharedInput,
    ) -> Self {
        Self {
            windows,
            monitors,
            resolver,
            input,
        }
    }

    fn entries(&self) -> Result<Vec<PickerEntry>> {
        let mut entries: Vec<PickerEntry> = self
            .windows
            .windows()
            .into_iter()
            .map(PickerEntry::Window)
            .collect();
        entries.extend(self.monitors.monitors()?.into_iter().map(PickerEntry::Monitor));
        Ok(entries)
    }
}

#[async_trait]
impl TargetPicker for ConsoleTargetPicker {
    async fn pick_target(&self) -> Result<Option<CaptureItem>> {
        let entries = self.entries()?;
        if entries.is_empty() {
            eprintln!("Nothing to capture.");
            return Ok(None);
        }

        let mut listing = String::new();
        for (index, entry) in entries.iter().enumerate() {
            match entry {
                PickerEntry::Window(w) => listing.push_str(&format!("  [{}] {}\n", index + 1, w.title)),
                PickerEntry::Monitor(m) => {
                    listing.push_str(&format!("  [{}] Monitor {}\n", index + 1, m.label()))
                }
            }
        }
        eprint!("{}", listing);

        loop {
            let answer = prompt_line(&self.input, "Capture which target? (q to cancel): ".into()).await?;
            if is_cancel(&answer) {
                return Ok(None);
            }
            let text = answer.unwrap_or_default();

            let chosen = text
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| entries.get(i));
            let Some(entry) = chosen else {
                eprintln!("'{}' is not in the list.", text);
                continue;
            };

            let item = match entry {
                PickerEntry::Window(w) => self.resolver.item_for_window(w.handle)?,
                PickerEntry::Monitor(m) => self.resolver.item_for_monitor(m.handle)?,
            };
            return Ok(Some(item));
        }
    }
}

/// Save-location prompt; a preset path skips the prompt
pub struct ConsoleSaveFilePicker {
    preset: Option<PathBuf>,
    input: SharedInput,
}

impl ConsoleSaveFilePicker {
    pub fn new(preset: Option<PathBuf>, input: SharedInput) -> Self {
        Self { preset, input }
    }
}

fn with_default_extension(path: &Path, default_extension: &str) -> PathBuf {
    if path.extension().is_some() {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(default_extension);
    PathBuf::from(name)
}

#[async_trait]
impl SaveFilePicker for ConsoleSaveFilePicker {
    async fn pick_save_file(&self, request: &SaveFileRequest) -> Result<Option<SaveFile>> {
        if let Some(path) = &self.preset {
            return Ok(Some(SaveFile::new(with_default_extension(
                path,
                &request.default_extension,
            ))));
        }

        let suggested = request.suggested_path();
        let types = request
            .file_type_choices
            .iter()
            .map(|(label, exts)| format!("{} ({})", label, exts.join(", ")))
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Save snapshot as [{}]\n  types: {}\n  (q to cancel): ",
            suggested.display(),
            types
        );

        let answer = prompt_line(&self.input, prompt).await?;
        if is_cancel(&answer) {
            return Ok(None);
        }

        let text = answer.unwrap_or_default();
        let path = if text.is_empty() {
            suggested
        } else {
            with_default_extension(Path::new(&text), &request.default_extension)
        };
        Ok(Some(SaveFile::new(path)))
    }
}

/// Messages go to stderr
pub struct ConsoleMessageDialog;

#[async_trait]
impl MessageDialog for ConsoleMessageDialog {
    async fn show_message(&self, message: &str) -> Result<()> {
        log::warn!("[Dialog] {}", message);
        eprintln!("{}", message);
        Ok(())
    }
}

/// Prints window list changes as they happen
#[derive(Default)]
pub struct ConsoleListObserver {
    rows: Mutex<Vec<String>>,
}

impl ConsoleListObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<String> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl WindowListObserver for ConsoleListObserver {
    fn append(&self, title: &str) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("console rows poisoned"))?;
        rows.push(title.to_string());
        println!("+ [{}] {}", rows.len(), title);
        Ok(())
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("console rows poisoned"))?;
        if index >= rows.len() {
            return Err(anyhow!("row {} out of range ({} rows)", index, rows.len()));
        }
        let title = rows.remove(index);
        println!("- [{}] {}", index + 1, title);
        Ok(())
    }

    fn reset_and_repopulate(&self, windows: &[WindowInfo]) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("console rows poisoned"))?;
        *rows = windows.iter().map(|w| w.title.clone()).collect();
        for (index, title) in rows.iter().enumerate() {
            println!("  [{}] {}", index + 1, title);
        }
        Ok(())
    }
}

/// Render target that keeps the attached surface for frame statistics.
#[derive(Default)]
pub struct SurfaceStatsTarget {
    surface: Mutex<Option<RenderSurface>>,
}

impl SurfaceStatsTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(&self) -> Option<RenderSurface> {
        self.surface.lock().ok().and_then(|s| s.clone())
    }

    /// One-line status, or `None` while detached.
    pub fn report(&self) -> Option<String> {
        let surface = self.attached()?;
        let size = surface
            .latest_frame()
            .map(|f| format!("{}x{} {}", f.width, f.height, f.pixel_format))
            .unwrap_or_else(|| "no frame yet".to_string());
        Some(format!("{} frames presented ({})", surface.frames_presented(), size))
    }
}

impl RenderTarget for SurfaceStatsTarget {
    fn set_surface(&self, surface: Option<RenderSurface>) -> Result<()> {
        let mut slot = self
            .surface
            .lock()
            .map_err(|_| anyhow!("render target lock poisoned"))?;
        log::debug!("[Console] Surface {}", if surface.is_some() { "attached" } else { "detached" });
        *slot = surface;
        Ok(())
    }
}
