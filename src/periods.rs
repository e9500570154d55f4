use crate::config::{PeriodWindow, default_periods};

/// Configured time-of-day windows (Morning, Noon, ...).
#[derive(Debug, Clone)]
pub struct PeriodSchedule {
    windows: Vec<PeriodWindow>,
}

impl PeriodSchedule {
    pub fn new(windows: &[PeriodWindow]) -> Self {
        Self {
            windows: windows.to_vec(),
        }
    }

    pub fn windows(&self) -> &[PeriodWindow] {
        &self.windows
    }

    /// Look up a window by its (case-sensitive) name.
    pub fn window(&self, name: &str) -> Option<&PeriodWindow> {
        self.windows.iter().find(|w| w.name == name)
    }

    /// First window with `start_hour <= hour < end_hour`.
    pub fn classify(&self, hour: f64) -> Option<&PeriodWindow> {
        self.windows
            .iter()
            .find(|w| w.start_hour <= hour && hour < w.end_hour)
    }

    /// Whether `hour` lies inside the window called `name`.
    ///
    /// `None` when no such window is configured.
    pub fn is_within(&self, name: &str, hour: f64) -> Option<bool> {
        self.window(name)
            .map(|w| w.start_hour <= hour && hour <= w.end_hour)
    }

    pub fn color_for(&self, name: &str) -> Option<&str> {
        self.window(name).map(|w| w.color.as_str())
    }
}

impl Default for PeriodSchedule {
    fn default() -> Self {
        Self {
            windows: default_periods(),
        }
    }
}

/// Format a fractional hour as `HH:MM` (11.5 -> "11:30").
pub fn format_hour(hour: f64) -> String {
    let total_minutes = (hour * 60.0).round() as i64;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}
