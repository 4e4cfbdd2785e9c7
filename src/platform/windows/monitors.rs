use std::mem;

use anyhow::Result;
use windows::core::BOOL;
use windows::Win32::Foundation::{LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFOEXW,
};

use crate::monitors::{MonitorEnumerator, MonitorHandle, MonitorInfo};

// MONITORINFOF_PRIMARY
const MONITOR_PRIMARY_FLAG: u32 = 1;

unsafe extern "system" fn enum_proc(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<MonitorInfo>);

    let mut info: MONITORINFOEXW = mem::zeroed();
    info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

    if GetMonitorInfoW(hmonitor, &mut info.monitorInfo as *mut _ as *mut _).as_bool() {
        let rect = info.monitorInfo.rcMonitor;
        let name = String::from_utf16_lossy(&info.szDevice);
        monitors.push(MonitorInfo {
            handle: MonitorHandle(hmonitor.0 as isize),
            name: name.trim_end_matches('\0').to_string(),
            x: rect.left,
            y: rect.top,
            width: (rect.right - rect.left) as u32,
            height: (rect.bottom - rect.top) as u32,
            is_primary: info.monitorInfo.dwFlags & MONITOR_PRIMARY_FLAG != 0,
        });
    } else {
        log::warn!("[Monitors] GetMonitorInfoW failed for {:?}", hmonitor);
    }

    BOOL::from(true)
}

pub struct Win32MonitorEnumerator;

impl MonitorEnumerator for Win32MonitorEnumerator {
    fn monitors(&self) -> Result<Vec<MonitorInfo>> {
        let mut monitors: Vec<MonitorInfo> = Vec::new();
        unsafe {
            let monitors_ptr = &mut monitors as *mut Vec<MonitorInfo> as isize;
            let _ = EnumDisplayMonitors(
                Some(HDC::default()),
                None,
                Some(enum_proc),
                LPARAM(monitors_ptr),
            );
        }
        log::debug!("[Monitors] Found {} monitors", monitors.len());
        Ok(monitors)
    }
}
