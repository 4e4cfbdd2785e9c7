//! Win32 window queries behind `WindowProbe`

use anyhow::Result;
use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetShellWindow, GetWindowLongW, GetWindowTextLengthW,
    GetWindowTextW, IsWindowVisible, GA_ROOT, GWL_STYLE, WS_DISABLED,
};

use crate::window_filter::{CloakReason, WindowHandle, WindowProbe};

pub(crate) fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut std::ffi::c_void)
}

pub(crate) fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

fn non_null(hwnd: HWND) -> Option<WindowHandle> {
    if hwnd.is_invalid() {
        None
    } else {
        Some(from_hwnd(hwnd))
    }
}

/// `EnumWindows` callback: collects every handle, never stops early.
unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = lparam.0 as *mut Vec<WindowHandle>;
    if handles.is_null() {
        return BOOL(0);
    }
    (*handles).push(from_hwnd(hwnd));
    BOOL(1)
}

pub struct Win32WindowProbe;

impl WindowProbe for Win32WindowProbe {
    fn top_level_windows(&self) -> Result<Vec<WindowHandle>> {
        let mut handles: Vec<WindowHandle> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut handles as *mut Vec<WindowHandle> as isize),
            )?;
        }
        log::trace!("[Win32Probe] EnumWindows returned {} windows", handles.len());
        Ok(handles)
    }

    fn shell_window(&self) -> Option<WindowHandle> {
        non_null(unsafe { GetShellWindow() })
    }

    fn title(&self, window: WindowHandle) -> String {
        let hwnd = to_hwnd(window);
        unsafe {
            let length = GetWindowTextLengthW(hwnd);
            if length <= 0 {
                return String::new();
            }
            let mut buffer: Vec<u16> = vec![0; (length + 1) as usize];
            let read = GetWindowTextW(hwnd, &mut buffer);
            if read <= 0 {
                return String::new();
            }
            buffer.truncate(read as usize);
            String::from_utf16_lossy(&buffer)
        }
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        unsafe { IsWindowVisible(to_hwnd(window)).as_bool() }
    }

    fn root_ancestor(&self, window: WindowHandle) -> Option<WindowHandle> {
        non_null(unsafe { GetAncestor(to_hwnd(window), GA_ROOT) })
    }

    fn is_disabled(&self, window: WindowHandle) -> bool {
        let style = unsafe { GetWindowLongW(to_hwnd(window), GWL_STYLE) } as u32;
        style & WS_DISABLED.0 != 0
    }

    fn cloak_reason(&self, window: WindowHandle) -> Option<CloakReason> {
        let mut cloaked: u32 = 0;
        let queried = unsafe {
            DwmGetWindowAttribute(
                to_hwnd(window),
                DWMWA_CLOAKED,
                &mut cloaked as *mut u32 as *mut _,
                std::mem::size_of::<u32>() as u32,
            )
        };
        match queried {
            Ok(()) => CloakReason::from_raw(cloaked),
            Err(e) => {
                log::trace!("[Win32Probe] DWMWA_CLOAKED query failed for {}: {:?}", window, e);
                None
            }
        }
    }
}
