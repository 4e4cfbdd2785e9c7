use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::capture::{CaptureItem, CaptureSession, PixelFormat};
use crate::capture_deps::{CaptureDeps, SaveFile, SaveFileRequest};
use crate::config;
use crate::dispatcher::run_on_owner;
use crate::encoder::ImageFormat;
use crate::monitors::MonitorHandle;
use crate::window_filter::WindowHandle;

struct CaptureState {
    session: Option<Box<dyn CaptureSession>>,
    pixel_format: PixelFormat,
}

struct CaptureAppInner {
    deps: CaptureDeps,
    state: Mutex<CaptureState>,
    snapshot_dir: Option<PathBuf>,
}

/// Owns the active capture session and runs the user-facing workflows:
/// start from a window, monitor or picker, stop, and snapshot.
///
/// Cloning shares the same orchestrator.
#[derive(Clone)]
pub struct CaptureApp {
    inner: Arc<CaptureAppInner>,
}

impl CaptureApp {
    pub fn new(deps: CaptureDeps) -> Self {
        Self::with_options(deps, PixelFormat::default(), None)
    }

    /// `snapshot_dir` is where the save picker starts.
    pub fn with_options(
        deps: CaptureDeps,
        pixel_format: PixelFormat,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(CaptureAppInner {
                deps,
                state: Mutex::new(CaptureState {
                    session: None,
                    pixel_format,
                }),
                snapshot_dir,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CaptureState>> {
        self.inner
            .state
            .lock()
            .map_err(|_| anyhow!("capture state lock poisoned"))
    }

    fn read(&self) -> MutexGuard<'_, CaptureState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Capture a top-level window.
    pub fn start_from_window(&self, window: WindowHandle) -> Result<CaptureItem> {
        tracing::info!(window = %window, "Starting capture from window");
        let item = self
            .inner
            .deps
            .resolver
            .item_for_window(window)
            .with_context(|| format!("Failed to create capture item for window {}", window))?;
        self.start_session(item.clone())?;
        Ok(item)
    }

    /// Capture a whole monitor.
    pub fn start_from_monitor(&self, monitor: MonitorHandle) -> Result<CaptureItem> {
        tracing::info!(monitor = %monitor, "Starting capture from monitor");
        let item = self
            .inner
            .deps
            .resolver
            .item_for_monitor(monitor)
            .with_context(|| format!("Failed to create capture item for monitor {}", monitor))?;
        self.start_session(item.clone())?;
        Ok(item)
    }

    /// Let the user pick a target, then start capturing it on the owner thread.
    ///
    /// Returns `Ok(None)` if the picker was cancelled.
    pub async fn start_from_picker(&self) -> Result<Option<CaptureItem>> {
        let Some(item) = self.inner.deps.target_picker.pick_target().await? else {
            tracing::info!("Capture picker cancelled");
            return Ok(None);
        };

        tracing::info!(item = item.display_name(), "Capture target picked");
        let app = self.clone();
        let picked = item.clone();
        run_on_owner(self.inner.deps.owner.as_ref(), move || app.start_session(picked)).await?;
        Ok(Some(item))
    }

    /// Start capturing `item`, replacing any active session.
    pub fn start_session(&self, item: CaptureItem) -> Result<()> {
        let deps = &self.inner.deps;
        let mut state = self.lock()?;

        if let Some(mut previous) = state.session.take() {
            tracing::debug!(item = previous.item().display_name(), "Closing previous session");
            previous.close();
            deps.render_target.set_surface(None)?;
        }

        let display_name = item.display_name().to_string();
        let mut session = deps
            .sessions
            .create_session(item, state.pixel_format)
            .context("Failed to create capture session")?;
        let surface = session.create_surface()?;
        deps.render_target.set_surface(Some(surface))?;

        if let Err(e) = session.start() {
            tracing::error!(error = %e, item = %display_name, "Capture session failed to start");
            session.close();
            deps.render_target.set_surface(None)?;
            return Err(e);
        }

        tracing::info!(
            item = %display_name,
            pixel_format = %state.pixel_format,
            "Capture session started"
        );
        state.session = Some(session);
        Ok(())
    }

    /// Close the active session and detach its surface. No-op when idle.
    pub fn stop_session(&self) -> Result<()> {
        let mut state = self.lock()?;
        let Some(mut session) = state.session.take() else {
            return Ok(());
        };

        session.close();
        self.inner.deps.render_target.set_surface(None)?;
        tracing::info!(item = session.item().display_name(), "Capture session stopped");
        Ok(())
    }

    /// Save one frame of the active capture to a user-chosen file.
    ///
    /// Returns the saved file, or `Ok(None)` when idle, cancelled, or the
    /// chosen extension is not an image format.
    pub async fn take_snapshot(&self) -> Result<Option<SaveFile>> {
        let Some(item) = self.current_item() else {
            tracing::debug!("Snapshot requested with no active capture");
            return Ok(None);
        };

        let deps = &self.inner.deps;
        let request = SaveFileRequest::snapshot(self.inner.snapshot_dir.clone());
        let Some(file) = deps.save_picker.pick_save_file(&request).await? else {
            tracing::info!("Snapshot cancelled");
            return Ok(None);
        };

        let extension = file.extension();
        let Some(format) = ImageFormat::from_extension(&extension) else {
            tracing::warn!(extension = %extension, "Unsupported snapshot format");
            deps.dialogs
                .show_message(config::snapshot::UNSUPPORTED_FORMAT_MESSAGE)
                .await?;
            return Ok(None);
        };

        let timeout = Duration::from_millis(config::capture::SNAPSHOT_TIMEOUT_MS);
        let frame = tokio::time::timeout(timeout, deps.grabber.grab_frame(&item, format.pixel_format()))
            .await
            .map_err(|_| anyhow!("Timed out waiting for a snapshot frame"))??;

        // The destination is only opened once the image is fully encoded.
        let mut encoded = Vec::new();
        deps.encoder.encode(&frame, &mut encoded, format)?;
        file.write_contents(&encoded)?;

        tracing::info!(
            path = ?file.path(),
            format = ?format,
            width = frame.width,
            height = frame.height,
            "Snapshot saved"
        );
        Ok(Some(file))
    }

    pub fn is_capturing(&self) -> bool {
        self.read().session.is_some()
    }

    pub fn current_item(&self) -> Option<CaptureItem> {
        self.read().session.as_ref().map(|s| s.item().clone())
    }

    /// `false` when idle.
    pub fn is_cursor_enabled(&self) -> bool {
        self.read()
            .session
            .as_ref()
            .map(|s| s.is_cursor_enabled())
            .unwrap_or(false)
    }

    /// Ignored when idle.
    pub fn set_cursor_enabled(&self, enabled: bool) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(session) = state.session.as_mut() {
            session.set_cursor_enabled(enabled)?;
            tracing::debug!(enabled, "Cursor capture changed");
        }
        Ok(())
    }

    /// `false` when idle.
    pub fn is_border_required(&self) -> bool {
        self.read()
            .session
            .as_ref()
            .map(|s| s.is_border_required())
            .unwrap_or(false)
    }

    /// Ignored when idle.
    pub fn set_border_required(&self, required: bool) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(session) = state.session.as_mut() {
            session.set_border_required(required)?;
            tracing::debug!(required, "Capture border changed");
        }
        Ok(())
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.read().pixel_format
    }

    /// Remembered for later sessions and applied to the active one.
    pub fn set_pixel_format(&self, format: PixelFormat) -> Result<()> {
        let mut state = self.lock()?;
        state.pixel_format = format;
        if let Some(session) = state.session.as_mut() {
            session.set_pixel_format(format)?;
        }
        tracing::debug!(pixel_format = %format, "Pixel format changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::capture::{
        CaptureItemResolver, CaptureSessionFactory, CaptureTarget, CapturedFrame, FrameGrabber,
        RenderSurface,
    };
    use crate::capture_deps::{MessageDialog, RenderTarget, SaveFilePicker, TargetPicker};
    use crate::dispatcher::{owner_queue, OwnerPump};
    use crate::encoder::ImageEncoder;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MockCapturePlatform {
        calls: Mutex<Vec<&'static str>>,
        picked: Mutex<Option<CaptureItem>>,
        save_to: Mutex<Option<PathBuf>>,
        requests: Mutex<Vec<SaveFileRequest>>,
        messages: Mutex<Vec<String>>,
        grabbed_formats: Mutex<Vec<PixelFormat>>,
        session_formats: Mutex<Vec<PixelFormat>>,
        attached: Mutex<Option<RenderSurface>>,
        fail_start: Mutex<bool>,
        fail_grab: Mutex<bool>,
    }

    impl MockCapturePlatform {
        fn record(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct MockSession {
        platform: Arc<MockCapturePlatform>,
        item: CaptureItem,
        cursor: bool,
        border: bool,
    }

    impl CaptureSession for MockSession {
        fn item(&self) -> &CaptureItem {
            &self.item
        }

        fn start(&mut self) -> Result<()> {
            self.platform.record("session.start");
            if *self.platform.fail_start.lock().unwrap() {
                return Err(anyhow!("device removed"));
            }
            Ok(())
        }

        fn close(&mut self) {
            self.platform.record("session.close");
        }

        fn create_surface(&mut self) -> Result<RenderSurface> {
            self.platform.record("session.create_surface");
            Ok(RenderSurface::new())
        }

        fn is_cursor_enabled(&self) -> bool {
            self.cursor
        }

        fn set_cursor_enabled(&mut self, enabled: bool) -> Result<()> {
            self.platform.record("session.set_cursor_enabled");
            self.cursor = enabled;
            Ok(())
        }

        fn is_border_required(&self) -> bool {
            self.border
        }

        fn set_border_required(&mut self, required: bool) -> Result<()> {
            self.platform.record("session.set_border_required");
            self.border = required;
            Ok(())
        }

        fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
            self.platform.record("session.set_pixel_format");
            self.platform.session_formats.lock().unwrap().push(format);
            Ok(())
        }
    }

    struct MockDeps(Arc<MockCapturePlatform>);

    impl CaptureItemResolver for MockDeps {
        fn item_for_window(&self, window: WindowHandle) -> Result<CaptureItem> {
            self.0.record("item_for_window");
            Ok(CaptureItem::new("Notepad", (800, 600)).with_target(CaptureTarget::Window(window)))
        }

        fn item_for_monitor(&self, monitor: MonitorHandle) -> Result<CaptureItem> {
            self.0.record("item_for_monitor");
            Ok(CaptureItem::new("DISPLAY1", (1920, 1080))
                .with_target(CaptureTarget::Monitor(monitor)))
        }
    }

    impl CaptureSessionFactory for MockDeps {
        fn create_session(
            &self,
            item: CaptureItem,
            pixel_format: PixelFormat,
        ) -> Result<Box<dyn CaptureSession>> {
            self.0.record("create_session");
            self.0.session_formats.lock().unwrap().push(pixel_format);
            Ok(Box::new(MockSession {
                platform: Arc::clone(&self.0),
                item,
                cursor: true,
                border: true,
            }))
        }
    }

    #[async_trait]
    impl FrameGrabber for MockDeps {
        async fn grab_frame(
            &self,
            _item: &CaptureItem,
            pixel_format: PixelFormat,
        ) -> Result<CapturedFrame> {
            self.0.record("grab_frame");
            self.0.grabbed_formats.lock().unwrap().push(pixel_format);
            if *self.0.fail_grab.lock().unwrap() {
                return Err(anyhow!("capture item closed"));
            }
            Ok(CapturedFrame {
                width: 1,
                height: 1,
                stride: pixel_format.bytes_per_pixel(),
                pixel_format,
                data: vec![0; pixel_format.bytes_per_pixel() as usize],
            })
        }
    }

    impl ImageEncoder for MockDeps {
        fn encode(
            &self,
            _frame: &CapturedFrame,
            out: &mut dyn Write,
            _format: ImageFormat,
        ) -> Result<()> {
            self.0.record("encode");
            out.write_all(b"encoded")?;
            Ok(())
        }
    }

    impl RenderTarget for MockDeps {
        fn set_surface(&self, surface: Option<RenderSurface>) -> Result<()> {
            self.0
                .record(if surface.is_some() { "attach_surface" } else { "detach_surface" });
            *self.0.attached.lock().unwrap() = surface;
            Ok(())
        }
    }

    #[async_trait]
    impl TargetPicker for MockDeps {
        async fn pick_target(&self) -> Result<Option<CaptureItem>> {
            self.0.record("pick_target");
            Ok(self.0.picked.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl SaveFilePicker for MockDeps {
        async fn pick_save_file(&self, request: &SaveFileRequest) -> Result<Option<SaveFile>> {
            self.0.record("pick_save_file");
            self.0.requests.lock().unwrap().push(request.clone());
            Ok(self.0.save_to.lock().unwrap().clone().map(SaveFile::new))
        }
    }

    #[async_trait]
    impl MessageDialog for MockDeps {
        async fn show_message(&self, message: &str) -> Result<()> {
            self.0.record("show_message");
            self.0.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn build_test_app() -> (CaptureApp, Arc<MockCapturePlatform>, OwnerPump) {
        let platform = Arc::new(MockCapturePlatform::default());
        let mock = Arc::new(MockDeps(Arc::clone(&platform)));
        let (owner, pump) = owner_queue();
        let deps = CaptureDeps {
            resolver: mock.clone(),
            sessions: mock.clone(),
            grabber: mock.clone(),
            encoder: mock.clone(),
            render_target: mock.clone(),
            target_picker: mock.clone(),
            save_picker: mock.clone(),
            dialogs: mock,
            owner: Arc::new(owner),
        };
        (CaptureApp::new(deps), platform, pump)
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "capture_sample_controller_{}_{}",
            std::process::id(),
            name
        ))
    }

    fn call_index(calls: &[&'static str], name: &str) -> Option<usize> {
        calls.iter().position(|entry| *entry == name)
    }

    #[test]
    fn start_from_window_attaches_surface_before_starting() {
        let (app, platform, _pump) = build_test_app();

        let item = app.start_from_window(WindowHandle(0x42)).unwrap();

        assert_eq!(item.target(), Some(CaptureTarget::Window(WindowHandle(0x42))));
        assert!(app.is_capturing());
        let calls = platform.calls();
        assert_eq!(
            calls,
            vec![
                "item_for_window",
                "create_session",
                "session.create_surface",
                "attach_surface",
                "session.start"
            ]
        );
    }

    #[test]
    fn starting_again_closes_the_previous_session() {
        let (app, platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();
        app.start_from_monitor(MonitorHandle(2)).unwrap();

        let calls = platform.calls();
        let close = call_index(&calls, "session.close").unwrap();
        let second_create = calls.iter().rposition(|c| *c == "create_session").unwrap();
        assert!(close < second_create);
        assert_eq!(app.current_item().unwrap().display_name(), "DISPLAY1");
    }

    #[test]
    fn failed_start_leaves_app_idle() {
        let (app, platform, _pump) = build_test_app();
        *platform.fail_start.lock().unwrap() = true;

        assert!(app.start_from_window(WindowHandle(1)).is_err());
        assert!(!app.is_capturing());
        assert!(platform.attached.lock().unwrap().is_none());
    }

    #[test]
    fn stop_session_detaches_surface_and_is_idempotent() {
        let (app, platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();

        app.stop_session().unwrap();
        app.stop_session().unwrap();

        let calls = platform.calls();
        assert_eq!(calls.iter().filter(|c| **c == "session.close").count(), 1);
        assert_eq!(calls.last(), Some(&"detach_surface"));
        assert!(!app.is_capturing());
    }

    #[test]
    fn idle_queries_report_false_and_mutations_are_ignored() {
        let (app, platform, _pump) = build_test_app();

        assert!(!app.is_cursor_enabled());
        assert!(!app.is_border_required());
        app.set_cursor_enabled(false).unwrap();
        app.set_border_required(false).unwrap();

        assert!(platform.calls().is_empty());
    }

    #[test]
    fn session_toggles_are_forwarded() {
        let (app, _platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();
        assert!(app.is_cursor_enabled());

        app.set_cursor_enabled(false).unwrap();
        app.set_border_required(false).unwrap();

        assert!(!app.is_cursor_enabled());
        assert!(!app.is_border_required());
    }

    #[test]
    fn pixel_format_is_remembered_for_next_session() {
        let (app, platform, _pump) = build_test_app();
        app.set_pixel_format(PixelFormat::Rgba16Float).unwrap();
        assert!(!platform.calls().contains(&"session.set_pixel_format"));

        app.start_from_window(WindowHandle(1)).unwrap();
        app.set_pixel_format(PixelFormat::Bgra8).unwrap();

        assert_eq!(
            *platform.session_formats.lock().unwrap(),
            vec![PixelFormat::Rgba16Float, PixelFormat::Bgra8]
        );
        assert_eq!(app.pixel_format(), PixelFormat::Bgra8);
    }

    #[tokio::test]
    async fn picker_cancel_starts_nothing() {
        let (app, platform, _pump) = build_test_app();

        assert!(app.start_from_picker().await.unwrap().is_none());
        assert_eq!(platform.calls(), vec!["pick_target"]);
    }

    #[tokio::test]
    async fn picked_item_is_started() {
        let (app, platform, _pump) = build_test_app();
        *platform.picked.lock().unwrap() = Some(CaptureItem::new("Calculator", (320, 480)));

        let item = app.start_from_picker().await.unwrap().unwrap();

        assert_eq!(item.display_name(), "Calculator");
        assert!(app.is_capturing());
        assert!(platform.calls().contains(&"session.start"));
    }

    #[tokio::test]
    async fn snapshot_without_session_issues_no_prompts() {
        let (app, platform, _pump) = build_test_app();

        assert!(app.take_snapshot().await.unwrap().is_none());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn snapshot_with_unsupported_extension_shows_message() {
        let (app, platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();
        *platform.save_to.lock().unwrap() = Some(scratch_path("notes.txt"));

        assert!(app.take_snapshot().await.unwrap().is_none());

        assert_eq!(
            *platform.messages.lock().unwrap(),
            vec!["Unsupported file format!".to_string()]
        );
        let calls = platform.calls();
        assert!(!calls.contains(&"grab_frame"));
        assert!(!calls.contains(&"encode"));
    }

    #[tokio::test]
    async fn snapshot_cancel_returns_none() {
        let (app, platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();

        assert!(app.take_snapshot().await.unwrap().is_none());
        assert!(!platform.calls().contains(&"grab_frame"));
    }

    #[tokio::test]
    async fn jxr_snapshot_grabs_hdr_frame() {
        let (app, platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();
        let path = scratch_path("shot.jxr");
        *platform.save_to.lock().unwrap() = Some(path.clone());

        let saved = app.take_snapshot().await.unwrap().unwrap();

        assert_eq!(saved.path(), path.as_path());
        assert_eq!(
            *platform.grabbed_formats.lock().unwrap(),
            vec![PixelFormat::Rgba16Float]
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"encoded");
        let request = &platform.requests.lock().unwrap()[0];
        assert_eq!(request.suggested_file_name, "snapshot");
        assert_eq!(request.default_extension, ".png");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_grab_leaves_existing_file_untouched() {
        let (app, platform, _pump) = build_test_app();
        app.start_from_window(WindowHandle(1)).unwrap();
        let path = scratch_path("kept.png");
        std::fs::write(&path, b"earlier snapshot").unwrap();
        *platform.save_to.lock().unwrap() = Some(path.clone());
        *platform.fail_grab.lock().unwrap() = true;

        assert!(app.take_snapshot().await.is_err());

        assert!(!platform.calls().contains(&"encode"));
        assert_eq!(std::fs::read(&path).unwrap(), b"earlier snapshot");
        let _ = std::fs::remove_file(path);
    }
}
