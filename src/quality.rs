//! Data-quality audit
//!
//! Non-fatal checks over a visit log:
//! - Consecutive visits that overlap
//! - Period labels that match no configured window
//! - Visits arriving outside the window of their own label

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    metrics::{DerivedVisit, Gap},
    periods::PeriodSchedule,
};

/// A visit whose arrival lies outside its labelled period window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffWindowVisit {
    pub sequence: usize,
    pub date: NaiveDate,
    pub period: String,
    pub arrival_hour: f64,
    pub window_start: f64,
    pub window_end: f64,
}

/// Summary of an audit pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    pub days_processed: u32,
    pub visits_checked: usize,
    pub overlapping_pairs: u32,
    /// Unknown labels with their occurrence count, in first-seen order
    pub unknown_periods: Vec<(String, u32)>,
    pub off_window_visits: Vec<OffWindowVisit>,
}

impl QualitySummary {
    pub fn is_clean(&self) -> bool {
        self.overlapping_pairs == 0
            && self.unknown_periods.is_empty()
            && self.off_window_visits.is_empty()
    }
}

/// Audit a visit set and its gaps against the configured periods.
pub fn audit(visits: &[DerivedVisit], gaps: &[Gap], schedule: &PeriodSchedule) -> QualitySummary {
    let mut summary = QualitySummary {
        days_processed: visits.iter().map(|v| v.date).collect::<BTreeSet<_>>().len() as u32,
        visits_checked: visits.len(),
        overlapping_pairs: gaps.iter().filter(|g| g.negative_gap).count() as u32,
        ..Default::default()
    };

    for visit in visits {
        match schedule.window(&visit.period) {
            Some(window) => {
                if schedule.is_within(&visit.period, visit.arrival_hour) == Some(false) {
                    summary.off_window_visits.push(OffWindowVisit {
                        sequence: visit.sequence,
                        date: visit.date,
                        period: visit.period.clone(),
                        arrival_hour: visit.arrival_hour,
                        window_start: window.start_hour,
                        window_end: window.end_hour,
                    });
                }
            }
            None => match summary
                .unknown_periods
                .iter_mut()
                .find(|(name, _)| *name == visit.period)
            {
                Some((_, count)) => *count += 1,
                None => summary.unknown_periods.push((visit.period.clone(), 1)),
            },
        }
    }

    if summary.is_clean() {
        tracing::debug!("Audit of {} visits found no issues", summary.visits_checked);
    } else {
        tracing::info!(
            "Audit: {} overlaps, {} unknown labels, {} visits outside their window",
            summary.overlapping_pairs,
            summary.unknown_periods.len(),
            summary.off_window_visits.len()
        );
    }

    summary
}
