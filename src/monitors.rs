use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Opaque OS monitor identifier (an `HMONITOR` on Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorHandle(pub isize);

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub handle: MonitorHandle,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl MonitorInfo {
    /// Label used by pickers, e.g. `\\.\DISPLAY1 (1920x1080, primary)`.
    pub fn label(&self) -> String {
        if self.is_primary {
            format!("{} ({}x{}, primary)", self.name, self.width, self.height)
        } else {
            format!("{} ({}x{})", self.name, self.width, self.height)
        }
    }
}

/// Contract every platform implements to list capturable monitors.
pub trait MonitorEnumerator: Send + Sync {
    fn monitors(&self) -> Result<Vec<MonitorInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_marks_primary_monitor() {
        let monitor = MonitorInfo {
            handle: MonitorHandle(1),
            name: "DISPLAY1".to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            is_primary: true,
        };
        assert_eq!(monitor.label(), "DISPLAY1 (1920x1080, primary)");
    }
}
