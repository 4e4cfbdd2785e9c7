//! WinEvent hook feeding window-list notifications

use std::cell::RefCell;

use anyhow::{bail, Result};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::WINEVENT_OUTOFCONTEXT;

use super::window_probe::from_hwnd;
use crate::config::windows::{EVENT_OBJECT_DESTROY, EVENT_OBJECT_UNCLOAKED};
use crate::window_events::{
    Subscription, WindowEvent, WindowEventHandler, WindowEventKind, WindowEventSource,
};

thread_local! {
    // Out-of-context hooks are delivered on the installing thread's message
    // loop, so the handler lives with that thread.
    static HOOK_HANDLER: RefCell<Option<WindowEventHandler>> = const { RefCell::new(None) };
}

unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    let handler = HOOK_HANDLER.with(|slot| slot.borrow().clone());
    if let Some(handler) = handler {
        handler(&WindowEvent {
            handle: from_hwnd(hwnd),
            kind: WindowEventKind::from_raw(event),
            object_id: id_object,
            child_id: id_child,
        });
    }
}

/// `SetWinEventHook` over `EVENT_OBJECT_DESTROY..=EVENT_OBJECT_UNCLOAKED`.
///
/// One subscriber per thread; the thread must pump messages for events to
/// arrive.
pub struct Win32EventSource;

impl WindowEventSource for Win32EventSource {
    fn subscribe(&self, handler: WindowEventHandler) -> Result<Subscription> {
        if HOOK_HANDLER.with(|slot| slot.borrow().is_some()) {
            bail!("A window list is already subscribed on this thread");
        }

        let hook = unsafe {
            SetWinEventHook(
                EVENT_OBJECT_DESTROY,
                EVENT_OBJECT_UNCLOAKED,
                None,
                Some(win_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT,
            )
        };
        if hook.is_invalid() {
            bail!("SetWinEventHook failed");
        }

        HOOK_HANDLER.with(|slot| *slot.borrow_mut() = Some(handler));
        log::debug!("[WinEvents] Hook installed");

        Ok(Subscription::new(move || {
            unsafe {
                let _ = UnhookWinEvent(hook);
            }
            HOOK_HANDLER.with(|slot| slot.borrow_mut().take());
            log::debug!("[WinEvents] Hook removed");
        }))
    }
}
