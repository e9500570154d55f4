//! Presentation layer.
//!
//! Builds the chart series a front end draws (visit timeline, arrival-time
//! box plots, hours per period) and renders an analysis as text or JSON.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::{
    config::{AppConfig, ReportConfig, ThresholdsConfig},
    metrics::{
        AggregateReport, Analysis, DerivedVisit, Gap, YearMonth, daily_totals, group_by_date,
        months_present,
    },
    periods::{PeriodSchedule, format_hour},
    quality::QualitySummary,
};

const FALLBACK_COLOR: &str = "rgba(128,128,128,0.7)";

// ==================== Chart Series ====================

/// One visit drawn as a horizontal bar on its date's row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBar {
    pub date: NaiveDate,
    /// Row label, `dd.mm`
    pub label: String,
    pub start_hour: f64,
    pub end_hour: f64,
    pub period: String,
    pub duration_minutes: f64,
    pub is_short: bool,
    pub color: String,
    pub hover: String,
}

/// A short gap drawn as a dotted segment between two bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineGap {
    pub date: NaiveDate,
    pub label: String,
    pub start_hour: f64,
    pub end_hour: f64,
    pub duration_minutes: f64,
    pub color: String,
}

/// Span where two consecutive visits overlap (next arrival to previous departure).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineOverlap {
    pub date: NaiveDate,
    pub label: String,
    pub start_hour: f64,
    pub end_hour: f64,
    pub overlap_minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    pub bars: Vec<TimelineBar>,
    /// Short gaps between non-overlapping visits
    pub gaps: Vec<TimelineGap>,
    pub overlaps: Vec<TimelineOverlap>,
}

/// A configured period window, drawn as a shaded band or start/end lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBand {
    pub name: String,
    pub start_hour: f64,
    pub end_hour: f64,
    pub color: String,
    /// e.g. `Morning (6.0-10.0)`
    pub label: String,
}

/// Bands for every configured window, in configured order.
pub fn period_bands(schedule: &PeriodSchedule) -> Vec<PeriodBand> {
    schedule
        .windows()
        .iter()
        .map(|w| PeriodBand {
            name: w.name.clone(),
            start_hour: w.start_hour,
            end_hour: w.end_hour,
            color: w.color.clone(),
            label: format!("{} ({:.1}-{:.1})", w.name, w.start_hour, w.end_hour),
        })
        .collect()
}

fn hour_of(time: NaiveDateTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0
}

/// Build the daily timeline.
///
/// Only short gaps are included; overlapping visits go to `overlaps` so no
/// segment runs backwards.
pub fn timeline(
    visits: &[DerivedVisit],
    gaps: &[Gap],
    schedule: &PeriodSchedule,
    config: &ReportConfig,
) -> Timeline {
    let mut out = Timeline::default();

    for (date, day) in group_by_date(visits) {
        let label = date.format("%d.%m").to_string();
        for visit in day {
            let color = if visit.is_short {
                config.short_visit_color.clone()
            } else {
                schedule
                    .color_for(&visit.period)
                    .unwrap_or(FALLBACK_COLOR)
                    .to_string()
            };
            let hover = format!(
                "Date: {}\nTime: {}-{}\nDuration: {:.0} min\nPeriod: {}",
                label,
                visit.arrival.format("%H:%M"),
                visit.departure.format("%H:%M"),
                visit.duration_minutes,
                visit.period
            );
            out.bars.push(TimelineBar {
                date,
                label: label.clone(),
                start_hour: hour_of(visit.arrival),
                end_hour: hour_of(visit.departure),
                period: visit.period,
                duration_minutes: visit.duration_minutes,
                is_short: visit.is_short,
                color,
                hover,
            });
        }
    }

    for gap in gaps {
        let label = gap.date.format("%d.%m").to_string();
        if gap.negative_gap {
            out.overlaps.push(TimelineOverlap {
                date: gap.date,
                label,
                start_hour: hour_of(gap.gap_end),
                end_hour: hour_of(gap.gap_start),
                overlap_minutes: (gap.gap_start - gap.gap_end).num_minutes() as f64,
            });
        } else if gap.is_short {
            out.gaps.push(TimelineGap {
                date: gap.date,
                label,
                start_hour: hour_of(gap.gap_start),
                end_hour: hour_of(gap.gap_end),
                duration_minutes: gap.duration_minutes,
                color: config.gap_color.clone(),
            });
        }
    }

    out
}

/// Five-number summary of arrival hours for one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxStats {
    pub period: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Linear-interpolation quantile of an ascending, non-empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Arrival-hour distribution per period, in first-seen period order.
pub fn arrival_distribution(visits: &[DerivedVisit]) -> Vec<BoxStats> {
    let mut groups: Vec<(&str, Vec<f64>)> = Vec::new();
    for visit in visits {
        match groups.iter_mut().find(|(p, _)| *p == visit.period) {
            Some((_, hours)) => hours.push(visit.arrival_hour),
            None => groups.push((visit.period.as_str(), vec![visit.arrival_hour])),
        }
    }

    groups
        .into_iter()
        .map(|(period, mut hours)| {
            hours.sort_by(|a, b| a.total_cmp(b));
            BoxStats {
                period: period.to_string(),
                count: hours.len(),
                min: hours[0],
                q1: quantile(&hours, 0.25),
                median: quantile(&hours, 0.5),
                q3: quantile(&hours, 0.75),
                max: hours[hours.len() - 1],
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarPoint {
    pub label: String,
    pub value: f64,
    pub color: String,
}

/// Hours worked per period, in first-seen order.
pub fn hours_by_period(report: &AggregateReport, schedule: &PeriodSchedule) -> Vec<BarPoint> {
    report
        .periods
        .iter()
        .map(|p| BarPoint {
            label: p.period.clone(),
            value: p.total_hours,
            color: schedule
                .color_for(&p.period)
                .unwrap_or(FALLBACK_COLOR)
                .to_string(),
        })
        .collect()
}

// ==================== Metric Cards ====================

/// A headline figure with a secondary line, as shown on a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCard {
    pub label: String,
    pub value: String,
    pub delta: String,
}

impl MetricCard {
    fn new(label: impl Into<String>, value: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            delta: delta.into(),
        }
    }
}

/// Hours cards followed by care-quality cards.
pub fn metric_cards(report: &AggregateReport, thresholds: &ThresholdsConfig) -> Vec<MetricCard> {
    let short_gaps = match report.short_gap_percentage() {
        Ok(pct) => MetricCard::new(
            format!("Short Gaps (<{}h)", thresholds.short_gap_minutes / 60.0),
            format!("{} gaps", report.short_gap_count),
            format!("{:.1}% of all gaps", pct),
        ),
        Err(_) => MetricCard::new(
            format!("Short Gaps (<{}h)", thresholds.short_gap_minutes / 60.0),
            "n/a",
            "no day with two or more visits",
        ),
    };

    vec![
        MetricCard::new(
            "Total Hours Used",
            format!("{:.1} hours", report.total_hours),
            format!("{:.0} minutes", report.total_minutes),
        ),
        MetricCard::new(
            "Average Daily Hours",
            format!("{:.1} hours/day", report.daily_average_hours),
            format!("{:.0} minutes/day", report.daily_average_hours * 60.0),
        ),
        MetricCard::new(
            "Forecasted Month Total",
            format!("{:.1} hours", report.forecasted_month_hours),
            format!("{:+.1} hours remaining", report.remaining_forecast_hours),
        ),
        MetricCard::new(
            format!("Short Visits (<{} min)", thresholds.short_visit_minutes),
            format!("{} visits", report.short_visit_count),
            format!("{:.1}% of all visits", report.short_visit_pct),
        ),
        short_gaps,
        MetricCard::new(
            "Overall Average Duration",
            format!("{:.0} min", report.overall_average_minutes),
            format!(
                "Range: {:.0}-{:.0} min",
                report.min_duration_minutes, report.max_duration_minutes
            ),
        ),
    ]
}

// ==================== Rendering ====================

fn view_name(analysis: &Analysis) -> String {
    match analysis.month {
        Some(month) => format!("Month {}", month),
        None => "All visits".to_string(),
    }
}

/// Render an analysis as a plain-text report.
pub fn render_text(
    analysis: &Analysis,
    quality: Option<&QualitySummary>,
    config: &AppConfig,
    generated_at: DateTime<Local>,
) -> String {
    let report = &analysis.report;
    let schedule = PeriodSchedule::new(&config.periods);
    let mut out = String::new();

    let _ = writeln!(out, "{} - {}", config.report.title, view_name(analysis));
    let _ = writeln!(
        out,
        "{} to {} ({} days with visits, {} days covered) | generated {}",
        report.first_date,
        report.last_date,
        report.distinct_days,
        report.coverage_days,
        generated_at.format("%Y-%m-%d %H:%M")
    );

    let cards = metric_cards(report, &config.thresholds);
    let (hours, quality_cards) = cards.split_at(3);
    let _ = writeln!(out, "\nHours Analysis");
    for card in hours {
        let _ = writeln!(out, "  {:<28} {:>16}  ({})", card.label, card.value, card.delta);
    }
    let _ = writeln!(out, "\nCare Quality Metrics");
    for card in quality_cards {
        let _ = writeln!(out, "  {:<28} {:>16}  ({})", card.label, card.value, card.delta);
    }

    let _ = writeln!(out, "\nPeriods");
    for period in &report.periods {
        let window = schedule
            .window(&period.period)
            .map(|w| format!("{}-{}", format_hour(w.start_hour), format_hour(w.end_hour)))
            .unwrap_or_else(|| "unconfigured".to_string());
        let _ = writeln!(
            out,
            "  {:<10} {:>4} visits  avg {:>5.0} min  {:>6.1} h  [{}]",
            period.period, period.visit_count, period.average_minutes, period.total_hours, window
        );
    }

    let _ = writeln!(out, "\nDaily Hours");
    for (date, minutes) in daily_totals(&analysis.visits) {
        let _ = writeln!(out, "  {}  {:>5.1} h", date.format("%d.%m"), minutes / 60.0);
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "\nWarnings");
        for warning in &report.warnings {
            let _ = writeln!(out, "  - {}", warning);
        }
    }

    if let Some(quality) = quality.filter(|q| !q.is_clean()) {
        let _ = writeln!(out, "\nData Quality");
        for (name, count) in &quality.unknown_periods {
            let _ = writeln!(out, "  - unknown period '{}' ({} visits)", name, count);
        }
        for off in &quality.off_window_visits {
            let _ = writeln!(
                out,
                "  - {} {} arrival {} outside {}-{}",
                off.date.format("%d.%m"),
                off.period,
                format_hour(off.arrival_hour),
                format_hour(off.window_start),
                format_hour(off.window_end)
            );
        }
    }

    out
}

/// Message for a selected month that has no visits, naming the months that do.
pub fn empty_month_notice(month: YearMonth, visits: &[DerivedVisit]) -> String {
    let available: Vec<String> = months_present(visits)
        .iter()
        .map(ToString::to_string)
        .collect();
    if available.is_empty() {
        format!("No visits recorded in {}; the log is empty", month)
    } else {
        format!(
            "No visits recorded in {}; months with data: {}",
            month,
            available.join(", ")
        )
    }
}

/// Full machine-readable document for one view.
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub title: &'a str,
    pub view: String,
    pub generated_at: DateTime<Local>,
    pub thresholds: &'a ThresholdsConfig,
    pub report: &'a AggregateReport,
    pub cards: Vec<MetricCard>,
    pub timeline: Timeline,
    pub period_bands: Vec<PeriodBand>,
    pub arrival_distribution: Vec<BoxStats>,
    pub hours_by_period: Vec<BarPoint>,
    pub quality: Option<&'a QualitySummary>,
}

/// Render an analysis with its chart series as pretty-printed JSON.
pub fn render_json(
    analysis: &Analysis,
    quality: Option<&QualitySummary>,
    config: &AppConfig,
    generated_at: DateTime<Local>,
) -> Result<String> {
    let schedule = PeriodSchedule::new(&config.periods);
    let document = ReportDocument {
        title: &config.report.title,
        view: view_name(analysis),
        generated_at,
        thresholds: &config.thresholds,
        report: &analysis.report,
        cards: metric_cards(&analysis.report, &config.thresholds),
        timeline: timeline(&analysis.visits, &analysis.gaps, &schedule, &config.report),
        period_bands: period_bands(&schedule),
        arrival_distribution: arrival_distribution(&analysis.visits),
        hours_by_period: hours_by_period(&analysis.report, &schedule),
        quality,
    };
    serde_json::to_string_pretty(&document).context("Failed to serialize report")
}
