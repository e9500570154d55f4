use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    str::FromStr,
};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{AppConfig, PeriodWindow, ThresholdsConfig},
    error::{MetricsError, MetricsResult},
    loader::Visit,
};

// ==================== Derived Types ====================

/// A visit with its duration and short-visit classification.
///
/// Flat so it can be written straight to CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedVisit {
    /// Position of the record in the input file
    pub sequence: usize,
    pub date: NaiveDate,
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
    pub period: String,
    /// Departure minus arrival, fractional minutes
    pub duration_minutes: f64,
    /// Arrival as fractional hour-of-day (8:30 -> 8.5)
    pub arrival_hour: f64,
    pub is_short: bool,
}

/// Idle interval between two consecutive visits on the same date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub date: NaiveDate,
    /// Departure of the earlier visit
    pub gap_start: NaiveDateTime,
    /// Arrival of the later visit
    pub gap_end: NaiveDateTime,
    /// Clamped to zero when the visits overlap
    pub duration_minutes: f64,
    pub is_short: bool,
    /// The visits overlapped; `duration_minutes` was clamped
    pub negative_gap: bool,
}

/// Per-period summary, in the order periods first appear in the data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub period: String,
    pub visit_count: usize,
    pub average_minutes: f64,
    pub total_hours: f64,
    /// Whether the label matches a configured period window
    pub configured: bool,
}

/// Non-fatal observations attached to an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataWarning {
    /// No date had two or more visits, so gap statistics are not applicable.
    NoGapsAvailable,
    /// Two consecutive visits overlapped.
    NegativeGap {
        date: NaiveDate,
        previous_departure: NaiveDateTime,
        next_arrival: NaiveDateTime,
        overlap_minutes: f64,
    },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::NoGapsAvailable => write!(f, "{}", MetricsError::NoGapsAvailable),
            DataWarning::NegativeGap {
                date,
                previous_departure,
                next_arrival,
                overlap_minutes,
            } => write!(
                f,
                "Overlapping visits on {}: departure {} is after next arrival {} ({:.0} min)",
                date,
                previous_departure.format("%H:%M"),
                next_arrival.format("%H:%M"),
                overlap_minutes
            ),
        }
    }
}

/// Summary statistics over one view of the visit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total_minutes: f64,
    pub total_hours: f64,
    pub visit_count: usize,
    pub distinct_days: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub daily_average_hours: f64,
    /// Inclusive calendar span between first and last date
    pub coverage_days: i64,
    /// Days the daily rate is projected over
    pub projection_window_days: u32,
    pub forecasted_month_hours: f64,
    /// Forecast minus hours already recorded
    pub remaining_forecast_hours: f64,
    pub short_visit_count: usize,
    pub short_visit_pct: f64,
    pub gap_count: usize,
    pub short_gap_count: usize,
    /// `None` when there are no gaps
    pub short_gap_pct: Option<f64>,
    pub periods: Vec<PeriodSummary>,
    /// Mean of the per-period averages
    pub overall_average_minutes: f64,
    pub min_duration_minutes: f64,
    pub max_duration_minutes: f64,
    pub warnings: Vec<DataWarning>,
}

impl AggregateReport {
    /// Percentage of short gaps, or `NoGapsAvailable`.
    pub fn short_gap_percentage(&self) -> MetricsResult<f64> {
        self.short_gap_pct.ok_or(MetricsError::NoGapsAvailable)
    }

    pub fn period(&self, name: &str) -> Option<&PeriodSummary> {
        self.periods.iter().find(|p| p.period == name)
    }
}

// ==================== Month Selection ====================

/// A calendar month, parsed from `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct ParseMonthError(String);

impl FromStr for YearMonth {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMonthError(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(err)?;
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        YearMonth::new(year, month).ok_or_else(err)
    }
}

// ==================== Visit & Gap Derivation ====================

fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

fn hour_of_day(time: NaiveDateTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0
}

/// Derive duration and short-visit flag for every visit.
///
/// Fails on the first record whose departure precedes its arrival; such
/// records are never silently inverted.
pub fn derive_visit_metrics(
    visits: &[Visit],
    thresholds: &ThresholdsConfig,
) -> MetricsResult<Vec<DerivedVisit>> {
    visits
        .iter()
        .map(|visit| derive_visit(visit, thresholds))
        .collect()
}

fn derive_visit(visit: &Visit, thresholds: &ThresholdsConfig) -> MetricsResult<DerivedVisit> {
    if visit.departure < visit.arrival {
        return Err(MetricsError::InvalidRecord {
            sequence: visit.sequence,
            date: visit.date,
            arrival: visit.arrival,
            departure: visit.departure,
        });
    }

    let duration_minutes = minutes_between(visit.arrival, visit.departure);

    Ok(DerivedVisit {
        sequence: visit.sequence,
        date: visit.date,
        arrival: visit.arrival,
        departure: visit.departure,
        period: visit.period.clone(),
        duration_minutes,
        arrival_hour: hour_of_day(visit.arrival),
        is_short: duration_minutes < thresholds.short_visit_minutes,
    })
}

/// Group visits by date, each group sorted by arrival (ties keep input order).
pub fn group_by_date(visits: &[DerivedVisit]) -> BTreeMap<NaiveDate, Vec<DerivedVisit>> {
    let mut groups: BTreeMap<NaiveDate, Vec<DerivedVisit>> = BTreeMap::new();
    for visit in visits {
        groups.entry(visit.date).or_default().push(visit.clone());
    }
    for day in groups.values_mut() {
        day.sort_by(|a, b| {
            a.arrival
                .cmp(&b.arrival)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
    }
    groups
}

/// Derive the gaps between consecutive visits of a single date.
///
/// `visits_for_date` must already be sorted by arrival. Overlapping visits
/// yield a zero-length gap marked `negative_gap`.
pub fn derive_gaps(visits_for_date: &[DerivedVisit], thresholds: &ThresholdsConfig) -> Vec<Gap> {
    visits_for_date
        .windows(2)
        .map(|pair| {
            let (previous, next) = (&pair[0], &pair[1]);
            let raw = minutes_between(previous.departure, next.arrival);
            let negative_gap = raw < 0.0;
            if negative_gap {
                tracing::warn!(
                    "Overlapping visits on {}: {} departs after {} arrives",
                    previous.date,
                    previous.departure.format("%H:%M"),
                    next.arrival.format("%H:%M")
                );
            }
            let duration_minutes = raw.max(0.0);

            Gap {
                date: previous.date,
                gap_start: previous.departure,
                gap_end: next.arrival,
                duration_minutes,
                is_short: duration_minutes < thresholds.short_gap_minutes,
                negative_gap,
            }
        })
        .collect()
}

/// Gaps for every date, in date order.
pub fn derive_all_gaps(visits: &[DerivedVisit], thresholds: &ThresholdsConfig) -> Vec<Gap> {
    group_by_date(visits)
        .values()
        .flat_map(|day| derive_gaps(day, thresholds))
        .collect()
}

/// Total visit minutes per date.
pub fn daily_totals(visits: &[DerivedVisit]) -> BTreeMap<NaiveDate, f64> {
    let mut totals = BTreeMap::new();
    for visit in visits {
        *totals.entry(visit.date).or_insert(0.0) += visit.duration_minutes;
    }
    totals
}

// ==================== Filtering ====================

/// Keep only the visits that fall in the given calendar month.
pub fn filter_by_month(visits: &[DerivedVisit], year: i32, month: u32) -> Vec<DerivedVisit> {
    let selected = YearMonth { year, month };
    visits
        .iter()
        .filter(|v| selected.contains(v.date))
        .cloned()
        .collect()
}

/// Distinct months present in the data, ascending.
pub fn months_present(visits: &[DerivedVisit]) -> Vec<YearMonth> {
    visits
        .iter()
        .map(|v| YearMonth::of(v.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ==================== Aggregation ====================

/// Aggregate a set of visits and their gaps into a report.
///
/// # Arguments
/// * `visits` - The visits of the view (any order)
/// * `gaps` - Gaps derived from the same visits
/// * `periods` - Configured period windows, used to flag unknown labels
/// * `window_days` - Projection window; defaults to the length of the
///   calendar month of the first date
pub fn aggregate(
    visits: &[DerivedVisit],
    gaps: &[Gap],
    periods: &[PeriodWindow],
    window_days: Option<u32>,
) -> MetricsResult<AggregateReport> {
    let days: BTreeSet<NaiveDate> = visits.iter().map(|v| v.date).collect();
    let (Some(&first_date), Some(&last_date)) = (days.first(), days.last()) else {
        return Err(MetricsError::EmptyDataset);
    };
    let distinct_days = days.len();

    let total_minutes: f64 = visits.iter().map(|v| v.duration_minutes).sum();
    let total_hours = total_minutes / 60.0;
    let daily_average_hours = total_hours / distinct_days as f64;

    let coverage_days = (last_date - first_date).num_days() + 1;
    let projection_window_days =
        window_days.unwrap_or_else(|| u32::from(first_date.num_days_in_month()));
    let forecasted_month_hours =
        total_hours / coverage_days as f64 * projection_window_days as f64;

    let visit_count = visits.len();
    let short_visit_count = visits.iter().filter(|v| v.is_short).count();
    let short_visit_pct = short_visit_count as f64 / visit_count as f64 * 100.0;

    let gap_count = gaps.len();
    let short_gap_count = gaps.iter().filter(|g| g.is_short).count();
    let short_gap_pct =
        (gap_count > 0).then(|| short_gap_count as f64 / gap_count as f64 * 100.0);

    let periods = summarize_periods(visits, periods);
    let overall_average_minutes =
        periods.iter().map(|p| p.average_minutes).sum::<f64>() / periods.len() as f64;

    let min_duration_minutes = visits
        .iter()
        .map(|v| v.duration_minutes)
        .fold(f64::INFINITY, f64::min);
    let max_duration_minutes = visits
        .iter()
        .map(|v| v.duration_minutes)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut warnings = Vec::new();
    if gap_count == 0 {
        warnings.push(DataWarning::NoGapsAvailable);
    }
    for gap in gaps.iter().filter(|g| g.negative_gap) {
        warnings.push(DataWarning::NegativeGap {
            date: gap.date,
            previous_departure: gap.gap_start,
            next_arrival: gap.gap_end,
            overlap_minutes: minutes_between(gap.gap_end, gap.gap_start),
        });
    }

    tracing::debug!(
        "Aggregated {} visits over {} days ({} to {}): {:.1}h total",
        visit_count,
        distinct_days,
        first_date,
        last_date,
        total_hours
    );

    Ok(AggregateReport {
        total_minutes,
        total_hours,
        visit_count,
        distinct_days,
        first_date,
        last_date,
        daily_average_hours,
        coverage_days,
        projection_window_days,
        forecasted_month_hours,
        remaining_forecast_hours: forecasted_month_hours - total_hours,
        short_visit_count,
        short_visit_pct,
        gap_count,
        short_gap_count,
        short_gap_pct,
        periods,
        overall_average_minutes,
        min_duration_minutes,
        max_duration_minutes,
        warnings,
    })
}

fn summarize_periods(visits: &[DerivedVisit], configured: &[PeriodWindow]) -> Vec<PeriodSummary> {
    let mut order: Vec<(&str, usize, f64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for visit in visits {
        let slot = *index.entry(visit.period.as_str()).or_insert_with(|| {
            order.push((visit.period.as_str(), 0, 0.0));
            order.len() - 1
        });
        order[slot].1 += 1;
        order[slot].2 += visit.duration_minutes;
    }

    order
        .into_iter()
        .map(|(period, count, minutes)| PeriodSummary {
            period: period.to_string(),
            visit_count: count,
            average_minutes: minutes / count as f64,
            total_hours: minutes / 60.0,
            configured: configured.iter().any(|w| w.name == period),
        })
        .collect()
}

// ==================== Pipeline ====================

/// One fully computed view over the visit log.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// `None` for the whole-dataset view
    pub month: Option<YearMonth>,
    pub visits: Vec<DerivedVisit>,
    pub gaps: Vec<Gap>,
    pub report: AggregateReport,
}

/// Derive, optionally filter by month, then aggregate.
///
/// Returns `EmptyDataset` when the selected view has no visits; callers that
/// treat an empty month as normal should match on it.
pub fn analyze(
    visits: &[Visit],
    config: &AppConfig,
    month: Option<YearMonth>,
) -> MetricsResult<Analysis> {
    let derived = derive_visit_metrics(visits, &config.thresholds)?;
    let derived = match month {
        Some(m) => filter_by_month(&derived, m.year, m.month),
        None => derived,
    };

    let gaps = derive_all_gaps(&derived, &config.thresholds);
    let report = aggregate(
        &derived,
        &gaps,
        &config.periods,
        config.report.projection_window_days,
    )?;

    Ok(Analysis {
        month,
        visits: derived,
        gaps,
        report,
    })
}
