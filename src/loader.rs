use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{config::InputConfig, metrics::DerivedVisit, traits::Clock};

/// A single caregiver visit as read from the input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    /// Zero-based row position in the input file.
    pub sequence: usize,
    pub date: NaiveDate,
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
    pub period: String,
}

/// Row layout of the caregiver log CSV.
#[derive(Debug, Deserialize)]
struct VisitRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Coming")]
    coming: String,
    #[serde(rename = "Going")]
    going: String,
    #[serde(rename = "Time of day")]
    period: String,
}

fn parse_date(value: &str, format: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, format)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .with_context(|| format!("Invalid date '{}' (expected {})", value, format))
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .with_context(|| format!("Invalid time '{}' (expected HH:MM)", value))
}

impl VisitRow {
    fn into_visit(self, sequence: usize, date_format: &str) -> Result<Visit> {
        let date = parse_date(&self.date, date_format)?;
        let arrival = date.and_time(parse_time(&self.coming)?);
        let departure = date.and_time(parse_time(&self.going)?);
        Ok(Visit {
            sequence,
            date,
            arrival,
            departure,
            period: self.period,
        })
    }
}

/// Read every visit from a CSV reader, in input order.
pub fn read_visits<R: std::io::Read>(reader: R, date_format: &str) -> Result<Vec<Visit>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header")?.clone();

    let mut visits = Vec::new();
    for (sequence, record) in rdr.records().enumerate() {
        let record = record.context("Malformed CSV row")?;
        let line = record.position().map_or(0, |p| p.line());
        let row: VisitRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("Malformed CSV row at line {}", line))?;
        let visit = row
            .into_visit(sequence, date_format)
            .with_context(|| format!("Invalid visit at line {}", line))?;
        visits.push(visit);
    }
    Ok(visits)
}

/// Load all visits from the CSV file at `path`.
pub fn load_visits(path: &Path, config: &InputConfig) -> Result<Vec<Visit>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open visit log {}", path.display()))?;
    let visits = read_visits(file, &config.date_format)
        .with_context(|| format!("Failed to read visit log {}", path.display()))?;
    tracing::info!("Loaded {} visits from {}", visits.len(), path.display());
    Ok(visits)
}

// ==================== Cache ====================

/// Read-through cache of loaded visit logs.
///
/// Entries are keyed by path and invalidated when the file's modification
/// time changes.
#[derive(Debug)]
pub struct VisitCache {
    config: InputConfig,
    entries: HashMap<PathBuf, (SystemTime, Arc<[Visit]>)>,
}

impl VisitCache {
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Return the visits in `path`, reloading only if the file changed.
    pub fn get(&mut self, path: &Path) -> Result<Arc<[Visit]>> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat visit log {}", path.display()))?;

        if let Some((cached_at, visits)) = self.entries.get(path) {
            if *cached_at == modified {
                tracing::debug!("Visit log cache hit for {}", path.display());
                return Ok(Arc::clone(visits));
            }
        }

        let visits: Arc<[Visit]> = load_visits(path, &self.config)?.into();
        self.entries
            .insert(path.to_path_buf(), (modified, Arc::clone(&visits)));
        Ok(visits)
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Export ====================

/// Export derived visits to a timestamped CSV file.
///
/// # Arguments
/// * `visits` - Visits to write, one row each
/// * `output_dir` - Directory where the CSV file will be created
/// * `clock` - Clock for generating the timestamp in the filename
///
/// # Returns
/// The path to the created CSV file on success.
pub fn export_to_csv<C: Clock>(
    visits: &[DerivedVisit],
    output_dir: &Path,
    clock: &C,
) -> Result<PathBuf> {
    let export_time = clock.now_utc();
    let filename = format!(
        "care_monitor_export_{}.csv",
        export_time.format("%Y%m%d_%H%M%S")
    );
    let output_path = output_dir.join(&filename);

    let mut wtr = csv::Writer::from_path(&output_path).context("Failed to create CSV writer")?;
    for visit in visits {
        wtr.serialize(visit)
            .context("Failed to serialize visit")?;
    }
    wtr.flush().context("Failed to flush CSV writer")?;

    tracing::info!("Exported {} visits to {}", visits.len(), output_path.display());
    Ok(output_path)
}
