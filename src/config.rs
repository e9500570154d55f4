use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub thresholds: ThresholdsConfig,
    #[serde(default = "default_periods")]
    pub periods: Vec<PeriodWindow>,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
    /// chrono format string for the `Date` column
    pub date_format: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("caregiver_times.csv"),
            date_format: "%d.%m.%Y".to_string(),
        }
    }
}

/// Minute thresholds used to flag visits and gaps.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct ThresholdsConfig {
    pub short_visit_minutes: f64,
    pub short_gap_minutes: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            short_visit_minutes: 10.0,
            short_gap_minutes: 150.0,
        }
    }
}

/// A named time-of-day window (hours as fractional hour-of-day).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PeriodWindow {
    pub name: String,
    pub start_hour: f64,
    pub end_hour: f64,
    #[serde(default = "default_period_color")]
    pub color: String,
}

impl PeriodWindow {
    pub fn new(name: &str, start_hour: f64, end_hour: f64, color: &str) -> Self {
        Self {
            name: name.to_string(),
            start_hour,
            end_hour,
            color: color.to_string(),
        }
    }
}

fn default_period_color() -> String {
    "rgba(128,128,128,0.7)".to_string()
}

pub fn default_periods() -> Vec<PeriodWindow> {
    vec![
        PeriodWindow::new("Morning", 6.0, 10.0, "rgba(255,165,0,0.7)"),
        PeriodWindow::new("Noon", 11.5, 14.0, "rgba(30,144,255,0.7)"),
        PeriodWindow::new("Evening", 17.0, 20.0, "rgba(148,0,211,0.7)"),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    pub title: String,
    /// Overrides the calendar-month length used for the forecast.
    #[serde(default)]
    pub projection_window_days: Option<u32>,
    pub short_visit_color: String,
    pub gap_color: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Caregiver Time Analysis - Quality of Care".to_string(),
            projection_window_days: None,
            short_visit_color: "rgba(255,0,0,0.7)".to_string(),
            gap_color: "rgba(255,0,0,0.3)".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            thresholds: ThresholdsConfig::default(),
            periods: default_periods(),
            report: ReportConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, optionally layering an explicit file on top of the
    /// standard locations.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("care-monitor");

        let mut builder = Config::builder()
            // 1. Defaults
            .set_default("input.path", "caregiver_times.csv")?
            .set_default("input.date_format", "%d.%m.%Y")?
            .set_default("thresholds.short_visit_minutes", 10.0)?
            .set_default("thresholds.short_gap_minutes", 150.0)?
            .set_default("report.title", "Caregiver Time Analysis - Quality of Care")?
            .set_default("report.short_visit_color", "rgba(255,0,0,0.7)")?
            .set_default("report.gap_color", "rgba(255,0,0,0.3)")?
            // 2. Local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false));

        // 4. Explicit file from the command line (must exist)
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // 5. Environment variables (CARE__THRESHOLDS__SHORT_GAP_MINUTES=...)
        let builder = builder.add_source(Environment::with_prefix("CARE").separator("__"));

        let s = builder.build().context("Failed to build configuration")?;
        let config: AppConfig = s
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.thresholds.short_visit_minutes < 0.0 || self.thresholds.short_gap_minutes < 0.0 {
            anyhow::bail!("thresholds must be non-negative");
        }
        for period in &self.periods {
            if period.start_hour > period.end_hour {
                anyhow::bail!(
                    "period '{}' starts after it ends ({} > {})",
                    period.name,
                    period.start_hour,
                    period.end_hour
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // ==================== Default Value Tests ====================

    #[test]
    fn test_thresholds_config_defaults() {
        let config = ThresholdsConfig::default();
        assert_eq!(config.short_visit_minutes, 10.0);
        assert_eq!(config.short_gap_minutes, 150.0);
    }

    #[test]
    fn test_input_config_defaults() {
        let config = InputConfig::default();
        assert_eq!(config.path, PathBuf::from("caregiver_times.csv"));
        assert_eq!(config.date_format, "%d.%m.%Y");
    }

    #[test]
    fn test_default_periods_keep_declared_order() {
        let names: Vec<_> = default_periods().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Morning", "Noon", "Evening"]);
    }

    #[test]
    fn test_default_periods_are_well_formed() {
        for period in default_periods() {
            assert!(period.start_hour < period.end_hour, "{}", period.name);
            assert!(period.end_hour <= 24.0);
        }
    }

    // ==================== Config Loading Tests ====================

    #[test]
    fn test_config_load_with_defaults() {
        let config = AppConfig::load().expect("Config should load");
        assert!(config.thresholds.short_visit_minutes >= 0.0);
        assert!(!config.periods.is_empty());
        assert!(!config.report.title.is_empty());
    }

    #[test]
    fn test_explicit_config_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            r#"
[thresholds]
short_visit_minutes = 15.0
short_gap_minutes = 90.0

[report]
title = "March review"
short_visit_color = "red"
gap_color = "pink"
projection_window_days = 30

[[periods]]
name = "Early"
start_hour = 5.0
end_hour = 9.0
"#
        )
        .unwrap();

        let config = AppConfig::load_from(Some(file.path())).expect("Config should load");

        assert_eq!(config.thresholds.short_visit_minutes, 15.0);
        assert_eq!(config.thresholds.short_gap_minutes, 90.0);
        assert_eq!(config.report.title, "March review");
        assert_eq!(config.report.projection_window_days, Some(30));
        assert_eq!(config.periods.len(), 1);
        assert_eq!(config.periods[0].name, "Early");
        assert_eq!(config.periods[0].color, default_period_color());
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let result = AppConfig::load_from(Some(Path::new("/nonexistent/care-monitor.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_inverted_period_is_rejected() {
        let config = AppConfig {
            periods: vec![PeriodWindow::new("Broken", 12.0, 8.0, "red")],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let config = AppConfig {
            thresholds: ThresholdsConfig {
                short_visit_minutes: -1.0,
                short_gap_minutes: 150.0,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    // ==================== Environment Variable Override Tests ====================

    /// Helper to set an environment variable for the duration of `f`.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        // SAFETY: Test environment; no other test reads this key
        unsafe {
            std::env::set_var(key, value);
        }
        let result = f();
        unsafe {
            std::env::remove_var(key);
        }
        result
    }

    #[test]
    fn test_env_var_overrides_input_path() {
        let config = with_env_var("CARE__INPUT__PATH", "/data/visits.csv", || {
            AppConfig::load().expect("Config should load")
        });

        assert_eq!(
            config.input.path,
            PathBuf::from("/data/visits.csv"),
            "Environment variable should override input.path"
        );
    }
}
