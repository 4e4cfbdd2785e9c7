//! Window manager notifications
//!
//! A [`WindowEventSource`] delivers create/destroy/show/uncloak notifications
//! to a single subscribed handler. The subscription is an RAII guard: dropping
//! it unregisters the handler. Sources allow one subscriber at a time, which
//! is what keeps a second window list from being built on the same source.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::config::windows::{EVENT_OBJECT_DESTROY, EVENT_OBJECT_SHOW, EVENT_OBJECT_UNCLOAKED};
use crate::window_filter::WindowHandle;

/// Kind of window manager notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEventKind {
    Destroy,
    Show,
    Uncloaked,
    /// Any other event of the hooked range, carried as its raw id
    Other(u32),
}

impl WindowEventKind {
    pub fn from_raw(event: u32) -> Self {
        match event {
            EVENT_OBJECT_DESTROY => WindowEventKind::Destroy,
            EVENT_OBJECT_SHOW => WindowEventKind::Show,
            EVENT_OBJECT_UNCLOAKED => WindowEventKind::Uncloaked,
            other => WindowEventKind::Other(other),
        }
    }
}

/// One notification as delivered by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEvent {
    pub handle: WindowHandle,
    pub kind: WindowEventKind,
    pub object_id: i32,
    pub child_id: i32,
}

impl WindowEvent {
    /// Event about the window object itself (`OBJID_WINDOW`, `CHILDID_SELF`).
    pub fn for_window(handle: WindowHandle, kind: WindowEventKind) -> Self {
        Self {
            handle,
            kind,
            object_id: crate::config::windows::OBJID_WINDOW,
            child_id: crate::config::windows::CHILDID_SELF,
        }
    }
}

pub type WindowEventHandler = Arc<dyn Fn(&WindowEvent) + Send + Sync>;

/// Registration guard returned by [`WindowEventSource::subscribe`].
///
/// Not `Send`: OS hooks have to be released on the thread that installed them.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// Source of window notifications
pub trait WindowEventSource {
    /// Register `handler`. Fails if the source already has a subscriber.
    fn subscribe(&self, handler: WindowEventHandler) -> Result<Subscription>;
}

/// In-process event source.
///
/// Events are injected with [`LocalEventSource::emit`]. Used on platforms
/// without a native notification hook and to drive the registry in tests.
#[derive(Clone, Default)]
pub struct LocalEventSource {
    slot: Arc<Mutex<Option<WindowEventHandler>>>,
}

impl LocalEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to the subscriber. Returns `false` if nobody listens.
    pub fn emit(&self, event: WindowEvent) -> bool {
        // Clone the handler out so it runs without the slot locked.
        let handler = match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match handler {
            Some(handler) => {
                handler(&event);
                true
            }
            None => false,
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl WindowEventSource for LocalEventSource {
    fn subscribe(&self, handler: WindowEventHandler) -> Result<Subscription> {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(_) => bail!("window event source lock poisoned"),
        };
        if slot.is_some() {
            bail!("A window list is already subscribed to this event source");
        }
        *slot = Some(handler);

        let slot_ref = Arc::clone(&self.slot);
        Ok(Subscription::new(move || {
            if let Ok(mut slot) = slot_ref.lock() {
                *slot = None;
            }
        }))
    }
}
