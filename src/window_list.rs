//! Live list of capturable windows
//!
//! [`WindowList`] enumerates the capturable top-level windows once, then keeps
//! itself current from window-manager notifications. Attached observers (list
//! views) are told about every append and removal so their rows stay aligned
//! with the list's display order.
//!
//! All state lives behind one mutex: notification callbacks run on the
//! notification thread while callers mutate from their own thread.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::{anyhow, Result};

use crate::config::windows::{CHILDID_SELF, OBJID_WINDOW};
use crate::window_events::{
    Subscription, WindowEvent, WindowEventHandler, WindowEventKind, WindowEventSource,
};
use crate::window_filter::{is_capturable_window, WindowHandle, WindowInfo, WindowProbe};

/// A list display mirroring the window list (e.g. a combo box).
///
/// Calls are made while the list is locked; implementations must not call
/// back into the [`WindowList`].
pub trait WindowListObserver: Send + Sync {
    /// Append a row at the end.
    fn append(&self, title: &str) -> Result<()>;

    /// Remove the row at `index`.
    fn remove_at(&self, index: usize) -> Result<()>;

    /// Drop every row and show `windows` in order.
    fn reset_and_repopulate(&self, windows: &[WindowInfo]) -> Result<()>;
}

#[derive(Default)]
struct WindowListState {
    windows: Vec<WindowInfo>,
    seen: HashSet<WindowHandle>,
    observers: Vec<Arc<dyn WindowListObserver>>,
}

struct WindowListShared {
    state: Mutex<WindowListState>,
    probe: Arc<dyn WindowProbe>,
}

impl WindowListShared {
    fn lock(&self) -> Result<MutexGuard<'_, WindowListState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("window list lock poisoned"))
    }

    fn read(&self) -> MutexGuard<'_, WindowListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_window(&self, info: WindowInfo) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.seen.insert(info.handle) {
            return Ok(false);
        }

        log::debug!("[WindowList] Added {} {:?}", info.handle, info.title);
        state.windows.push(info);
        let title = &state.windows[state.windows.len() - 1].title;
        for observer in &state.observers {
            observer.append(title)?;
        }
        Ok(true)
    }

    fn remove_handle(&self, handle: WindowHandle) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.seen.remove(&handle) {
            return Ok(false);
        }

        let index = state
            .windows
            .iter()
            .position(|window| window.handle == handle)
            .ok_or_else(|| anyhow!("window {} tracked but missing from display order", handle))?;
        let removed = state.windows.remove(index);

        log::debug!(
            "[WindowList] Removed {} {:?} at index {}",
            removed.handle,
            removed.title,
            index
        );
        for observer in &state.observers {
            observer.remove_at(index)?;
        }
        Ok(true)
    }

    fn handle_event(&self, event: &WindowEvent) -> Result<()> {
        if event.kind == WindowEventKind::Destroy && event.child_id == CHILDID_SELF {
            self.remove_handle(event.handle)?;
            return Ok(());
        }

        let is_window_object = event.object_id == OBJID_WINDOW
            && event.child_id == CHILDID_SELF
            && !event.handle.is_null();
        let became_visible = matches!(event.kind, WindowEventKind::Show | WindowEventKind::Uncloaked);
        if !is_window_object || !became_visible || !self.probe.is_top_level(event.handle) {
            return Ok(());
        }

        let info = WindowInfo::from_probe(event.handle, self.probe.as_ref());
        if !info.title.is_empty() && is_capturable_window(&info, self.probe.as_ref()) {
            self.add_window(info)?;
        }
        Ok(())
    }
}

/// Read-only view of a [`WindowList`] that can be shared across threads.
#[derive(Clone)]
pub struct WindowListReader {
    shared: Arc<WindowListShared>,
}

impl WindowListReader {
    /// Windows in display order.
    pub fn windows(&self) -> Vec<WindowInfo> {
        self.shared.read().windows.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.read().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.shared.read().seen.contains(&handle)
    }
}

/// The capturable-window registry.
///
/// Owns its event subscription, so dropping the list stops notifications.
/// Only one list can be subscribed to an event source at a time.
pub struct WindowList {
    shared: Arc<WindowListShared>,
    _subscription: Subscription,
}

impl WindowList {
    /// Subscribe to `events` and populate from the currently open windows.
    pub fn new(probe: Arc<dyn WindowProbe>, events: &dyn WindowEventSource) -> Result<Self> {
        let shared = Arc::new(WindowListShared {
            state: Mutex::new(WindowListState::default()),
            probe,
        });

        // Subscribe before enumerating so no window shown in between is missed;
        // add_window is idempotent, so overlap is harmless.
        let subscription = events.subscribe(Self::event_handler(Arc::downgrade(&shared)))?;

        let list = Self {
            shared,
            _subscription: subscription,
        };
        list.populate()?;
        log::info!("[WindowList] Initialized with {} capturable windows", list.len());
        Ok(list)
    }

    fn event_handler(shared: Weak<WindowListShared>) -> WindowEventHandler {
        Arc::new(move |event: &WindowEvent| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if let Err(e) = shared.handle_event(event) {
                log::error!("[WindowList] Failed to apply {:?}: {:#}", event, e);
            }
        })
    }

    fn populate(&self) -> Result<()> {
        let probe = self.shared.probe.as_ref();
        for handle in probe.top_level_windows()? {
            let info = WindowInfo::from_probe(handle, probe);
            if info.title.is_empty() || !is_capturable_window(&info, probe) {
                continue;
            }
            self.shared.add_window(info)?;
        }
        Ok(())
    }

    /// Append `info` unless its handle is already listed. Returns whether it was added.
    pub fn add_window(&self, info: WindowInfo) -> Result<bool> {
        self.shared.add_window(info)
    }

    /// Remove the window with `info`'s handle. Returns whether it was listed.
    pub fn remove_window(&self, info: &WindowInfo) -> Result<bool> {
        self.shared.remove_handle(info.handle)
    }

    pub fn remove_handle(&self, handle: WindowHandle) -> Result<bool> {
        self.shared.remove_handle(handle)
    }

    /// Apply one window-manager notification.
    pub fn handle_event(&self, event: &WindowEvent) -> Result<()> {
        self.shared.handle_event(event)
    }

    /// Start mirroring into `observer`; it is repopulated immediately.
    pub fn attach_observer(&self, observer: Arc<dyn WindowListObserver>) -> Result<()> {
        let mut state = self.shared.lock()?;
        observer.reset_and_repopulate(&state.windows)?;
        state.observers.push(observer);
        Ok(())
    }

    /// Stop mirroring into `observer`. Returns whether it was attached.
    pub fn detach_observer(&self, observer: &Arc<dyn WindowListObserver>) -> Result<bool> {
        let mut state = self.shared.lock()?;
        let before = state.observers.len();
        state.observers.retain(|o| !Arc::ptr_eq(o, observer));
        Ok(state.observers.len() != before)
    }

    /// Clear `observer` and refill it from the current list.
    pub fn refresh_observer(&self, observer: &dyn WindowListObserver) -> Result<()> {
        let state = self.shared.lock()?;
        observer.reset_and_repopulate(&state.windows)
    }

    /// Windows in display order.
    pub fn windows(&self) -> Vec<WindowInfo> {
        self.reader().windows()
    }

    pub fn len(&self) -> usize {
        self.shared.read().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.shared.read().seen.contains(&handle)
    }

    pub fn reader(&self) -> WindowListReader {
        WindowListReader {
            shared: Arc::clone(&self.shared),
        }
    }
}
