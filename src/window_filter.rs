//! Platform-agnostic window filtering logic
//!
//! Decides which top-level windows are offered for capture. The OS queries are
//! behind [`WindowProbe`] so the rules can run (and be tested) anywhere; the
//! Win32 implementation lives in `platform::windows::window_probe`.

use std::fmt;
use std::hash::{Hash, Hasher};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config;

/// Opaque OS window identifier (an `HWND` on Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub const NULL: WindowHandle = WindowHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// A capturable window as shown in the selection list.
///
/// Identity is the handle: two infos with the same handle are equal even if
/// their titles differ (titles are captured once, when the info is created).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
}

impl WindowInfo {
    pub fn new(handle: WindowHandle, title: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
        }
    }

    /// Build an info for `handle`, reading the current title through `probe`.
    pub fn from_probe(handle: WindowHandle, probe: &dyn WindowProbe) -> Self {
        Self::new(handle, probe.title(handle))
    }
}

impl PartialEq for WindowInfo {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for WindowInfo {}

impl Hash for WindowInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

/// Why the compositor is hiding a window (`DWMWA_CLOAKED`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloakReason {
    /// Cloaked by its owner application
    App,
    /// Cloaked by the shell (e.g. on another virtual desktop)
    Shell,
    /// Inherited from an owner window
    Inherited,
    /// Any other non-zero attribute value
    Other(u32),
}

impl CloakReason {
    /// Interpret a raw `DWMWA_CLOAKED` value; `0` means not cloaked.
    pub fn from_raw(value: u32) -> Option<Self> {
        use config::windows::{DWM_CLOAKED_APP, DWM_CLOAKED_INHERITED, DWM_CLOAKED_SHELL};
        match value {
            0 => None,
            DWM_CLOAKED_APP => Some(CloakReason::App),
            DWM_CLOAKED_SHELL => Some(CloakReason::Shell),
            DWM_CLOAKED_INHERITED => Some(CloakReason::Inherited),
            other => Some(CloakReason::Other(other)),
        }
    }
}

/// Window-manager queries needed to decide capturability.
pub trait WindowProbe: Send + Sync {
    /// All current top-level windows, in z-order.
    fn top_level_windows(&self) -> Result<Vec<WindowHandle>>;

    /// The desktop shell window, if there is one.
    fn shell_window(&self) -> Option<WindowHandle>;

    /// Current window title (empty if none or unreadable).
    fn title(&self, window: WindowHandle) -> String;

    fn is_visible(&self, window: WindowHandle) -> bool;

    /// Root ancestor of the window (itself for top-level windows).
    fn root_ancestor(&self, window: WindowHandle) -> Option<WindowHandle>;

    /// Whether the window carries `WS_DISABLED`.
    fn is_disabled(&self, window: WindowHandle) -> bool;

    /// Compositor cloak state; `None` when not cloaked or when the query fails.
    fn cloak_reason(&self, window: WindowHandle) -> Option<CloakReason>;

    /// Whether the window is its own root ancestor.
    fn is_top_level(&self, window: WindowHandle) -> bool {
        self.root_ancestor(window) == Some(window)
    }
}

/// Reason a window was not offered for capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ShellWindow,
    EmptyTitle,
    Invisible,
    NotTopLevel,
    Disabled,
    CloakedByShell,
    ExcludedTitle,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::ShellWindow => "desktop shell window",
            Rejection::EmptyTitle => "empty title",
            Rejection::Invisible => "not visible",
            Rejection::NotTopLevel => "not a top-level window",
            Rejection::Disabled => "disabled",
            Rejection::CloakedByShell => "cloaked by the shell",
            Rejection::ExcludedTitle => "excluded system surface",
        };
        f.write_str(reason)
    }
}

/// First rule `window` fails, or `None` if it can be captured.
///
/// Rules are checked in a fixed order, cheapest first.
pub fn capture_rejection(window: &WindowInfo, probe: &dyn WindowProbe) -> Option<Rejection> {
    let handle = window.handle;

    if probe.shell_window() == Some(handle) {
        return Some(Rejection::ShellWindow);
    }

    if window.title.is_empty() {
        return Some(Rejection::EmptyTitle);
    }

    if !probe.is_visible(handle) {
        return Some(Rejection::Invisible);
    }

    if !probe.is_top_level(handle) {
        return Some(Rejection::NotTopLevel);
    }

    if probe.is_disabled(handle) {
        return Some(Rejection::Disabled);
    }

    if probe.cloak_reason(handle) == Some(CloakReason::Shell) {
        return Some(Rejection::CloakedByShell);
    }

    if config::windows::EXCLUDED_WINDOW_TITLES.contains(&window.title.as_str()) {
        return Some(Rejection::ExcludedTitle);
    }

    None
}

/// Check if a window should be offered for capture
pub fn is_capturable_window(window: &WindowInfo, probe: &dyn WindowProbe) -> bool {
    match capture_rejection(window, probe) {
        None => true,
        Some(reason) => {
            log::trace!("[Filter] Skipping {} ({:?}): {}", window.handle, window.title, reason);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Clone)]
    struct ProbeWindow {
        title: String,
        visible: bool,
        root: WindowHandle,
        disabled: bool,
        cloak: Option<CloakReason>,
    }

    #[derive(Default)]
    struct TableProbe {
        shell: Option<WindowHandle>,
        windows: HashMap<WindowHandle, ProbeWindow>,
    }

    impl TableProbe {
        fn with(mut self, handle: isize, title: &str) -> Self {
            let handle = WindowHandle(handle);
            self.windows.insert(
                handle,
                ProbeWindow {
                    title: title.to_string(),
                    visible: true,
                    root: handle,
                    disabled: false,
                    cloak: None,
                },
            );
            self
        }

        fn edit(mut self, handle: isize, f: impl FnOnce(&mut ProbeWindow)) -> Self {
            f(self.windows.get_mut(&WindowHandle(handle)).unwrap());
            self
        }

        fn info(&self, handle: isize) -> WindowInfo {
            WindowInfo::from_probe(WindowHandle(handle), self)
        }
    }

    impl WindowProbe for TableProbe {
        fn top_level_windows(&self) -> Result<Vec<WindowHandle>> {
            Ok(self.windows.keys().copied().collect())
        }

        fn shell_window(&self) -> Option<WindowHandle> {
            self.shell
        }

        fn title(&self, window: WindowHandle) -> String {
            self.windows.get(&window).map(|w| w.title.clone()).unwrap_or_default()
        }

        fn is_visible(&self, window: WindowHandle) -> bool {
            self.windows.get(&window).map_or(false, |w| w.visible)
        }

        fn root_ancestor(&self, window: WindowHandle) -> Option<WindowHandle> {
            self.windows.get(&window).map(|w| w.root)
        }

        fn is_disabled(&self, window: WindowHandle) -> bool {
            self.windows.get(&window).map_or(false, |w| w.disabled)
        }

        fn cloak_reason(&self, window: WindowHandle) -> Option<CloakReason> {
            self.windows.get(&window).and_then(|w| w.cloak)
        }
    }

    #[test]
    fn plain_top_level_window_is_capturable() {
        let probe = TableProbe::default().with(1, "Notepad");
        assert!(is_capturable_window(&probe.info(1), &probe));
    }

    #[test]
    fn shell_window_is_rejected() {
        let mut probe = TableProbe::default().with(1, "Program Manager");
        probe.shell = Some(WindowHandle(1));
        assert_eq!(capture_rejection(&probe.info(1), &probe), Some(Rejection::ShellWindow));
    }

    #[test]
    fn untitled_window_is_rejected() {
        let probe = TableProbe::default().with(1, "");
        assert_eq!(capture_rejection(&probe.info(1), &probe), Some(Rejection::EmptyTitle));
    }

    #[test]
    fn child_window_is_rejected() {
        let probe = TableProbe::default()
            .with(1, "Parent")
            .with(2, "Child")
            .edit(2, |w| w.root = WindowHandle(1));
        assert_eq!(capture_rejection(&probe.info(2), &probe), Some(Rejection::NotTopLevel));
    }

    #[test]
    fn disabled_and_hidden_windows_are_rejected() {
        let probe = TableProbe::default()
            .with(1, "Modal owner")
            .edit(1, |w| w.disabled = true)
            .with(2, "Hidden")
            .edit(2, |w| w.visible = false);
        assert_eq!(capture_rejection(&probe.info(1), &probe), Some(Rejection::Disabled));
        assert_eq!(capture_rejection(&probe.info(2), &probe), Some(Rejection::Invisible));
    }

    #[test]
    fn only_shell_cloaking_is_rejected() {
        let probe = TableProbe::default()
            .with(1, "Other desktop")
            .edit(1, |w| w.cloak = Some(CloakReason::Shell))
            .with(2, "App cloaked")
            .edit(2, |w| w.cloak = Some(CloakReason::App));
        assert_eq!(capture_rejection(&probe.info(1), &probe), Some(Rejection::CloakedByShell));
        assert!(is_capturable_window(&probe.info(2), &probe));
    }

    #[test]
    fn task_view_is_excluded_by_exact_title() {
        let probe = TableProbe::default().with(1, "Task View").with(2, "Task View Notes");
        assert_eq!(capture_rejection(&probe.info(1), &probe), Some(Rejection::ExcludedTitle));
        assert!(is_capturable_window(&probe.info(2), &probe));
    }

    #[test]
    fn cloak_reason_decodes_dwm_values() {
        assert_eq!(CloakReason::from_raw(0), None);
        assert_eq!(CloakReason::from_raw(2), Some(CloakReason::Shell));
        assert_eq!(CloakReason::from_raw(8), Some(CloakReason::Other(8)));
    }

    #[test]
    fn window_info_identity_is_the_handle() {
        let a = WindowInfo::new(WindowHandle(7), "Before");
        let b = WindowInfo::new(WindowHandle(7), "After");
        assert_eq!(a, b);
        assert_ne!(a, WindowInfo::new(WindowHandle(8), "Before"));
    }
}
