//! Care Monitor Library
//!
//! Analyzes caregiver visit logs: visit durations, gaps between visits,
//! short-visit and short-gap detection, and monthly projections.

pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod periods;
pub mod quality;
pub mod report;
pub mod traits;

// Re-export commonly used types
pub use config::{AppConfig, PeriodWindow, ThresholdsConfig};
pub use error::{MetricsError, MetricsResult};
pub use loader::{Visit, VisitCache, export_to_csv, load_visits, read_visits};
pub use metrics::{
    AggregateReport,
    Analysis,
    DataWarning,
    DerivedVisit,
    Gap,
    PeriodSummary,
    YearMonth,
    aggregate,
    // Pipeline
    analyze,
    daily_totals,
    derive_all_gaps,
    derive_gaps,
    // Core engine operations
    derive_visit_metrics,
    filter_by_month,
    group_by_date,
    months_present,
};
pub use periods::PeriodSchedule;
pub use quality::{QualitySummary, audit};
pub use report::{render_json, render_text};
pub use traits::{Clock, MockClock, SystemClock};
