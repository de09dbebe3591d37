use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::sleep::calculator::{average_bedtime, parse_date_time_strict};
use crate::sleep::model::{BedtimeRecord, BedtimeSensor};

pub const HISTORY_VERSION: u32 = 1;
/// Ceiling of the weekly consistency chart, in hours.
pub const CHART_MAX_VALUE: f32 = 10.0;
pub const WEEKDAY_LABELS: [&str; 7] = ["S", "M", "T", "W", "T", "F", "S"];

/// Bedtime history in insertion order.
///
/// Entries are kept exactly as stored so that ones this build cannot read
/// survive a save untouched.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BedtimeHistory {
    entries: Vec<StoredBedtime>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
struct StoredBedtime {
    timestamp: String,
    sensor: String,
}

impl StoredBedtime {
    fn from_record(record: &BedtimeRecord) -> Self {
        Self {
            timestamp: record.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            sensor: record.sensor.as_token().to_string(),
        }
    }

    fn parse(&self) -> Option<BedtimeRecord> {
        let timestamp = parse_date_time_strict(&self.timestamp).ok()?;
        let sensor = self.sensor.parse::<BedtimeSensor>().ok()?;
        Some(BedtimeRecord::new(timestamp, sensor))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeleteTarget {
    Entry(NaiveDateTime),
    All,
}

impl FromStr for DeleteTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(DeleteTarget::All);
        }
        let timestamp = parse_date_time_strict(s)?;
        Ok(DeleteTarget::Entry(timestamp))
    }
}

/// One column of the weekly consistency chart.
#[derive(Debug, Clone, Serialize)]
pub struct WeekdaySlot {
    pub label: &'static str,
    pub date: NaiveDate,
    pub bedtime: Option<NaiveTime>,
    pub value: f32,
}

impl BedtimeHistory {
    pub fn from_records(records: &[BedtimeRecord]) -> Self {
        let mut history = Self::default();
        for record in records {
            history.record(*record);
        }
        history
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `record` unless one with the same timestamp already exists.
    pub fn record(&mut self, record: BedtimeRecord) -> bool {
        let duplicate = self
            .entries
            .iter()
            .filter_map(StoredBedtime::parse)
            .any(|existing| existing.timestamp == record.timestamp);
        if duplicate {
            return false;
        }
        self.entries.push(StoredBedtime::from_record(&record));
        true
    }

    pub fn delete(&mut self, target: DeleteTarget) -> usize {
        let before = self.entries.len();
        match target {
            DeleteTarget::All => self.entries.clear(),
            DeleteTarget::Entry(timestamp) => self.entries.retain(|entry| {
                entry
                    .parse()
                    .is_none_or(|record| record.timestamp != timestamp)
            }),
        }
        before - self.entries.len()
    }

    /// Entries in the order they were stored.
    pub fn stored_order(&self) -> Vec<Option<BedtimeRecord>> {
        self.entries.iter().map(StoredBedtime::parse).collect()
    }

    /// Sorted by timestamp, most recent first. Unreadable entries sort last.
    pub fn newest_first(&self) -> Vec<Option<BedtimeRecord>> {
        let mut records = self.stored_order();
        records.sort_by(|a, b| match (a, b) {
            (Some(a), Some(b)) => b.timestamp.cmp(&a.timestamp),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        records
    }

    /// Average over the first seven stored entries, oldest recordings first.
    pub fn average_bedtime(&self) -> Option<NaiveTime> {
        average_bedtime(&self.stored_order())
    }

    /// Average over the seven most recent bedtimes by timestamp.
    pub fn recent_average_bedtime(&self) -> Option<NaiveTime> {
        average_bedtime(&self.newest_first())
    }

    /// Sunday-to-Saturday chart for the week containing `today`.
    ///
    /// Each day's value is how far (in whole hours) the bedtime sat from
    /// `goal`, flipped so that a bedtime on the goal draws the tallest bar.
    pub fn week_consistency(
        &self,
        today: NaiveDate,
        goal: Option<NaiveTime>,
    ) -> Option<Vec<WeekdaySlot>> {
        let goal = goal?;
        let days_from_sunday = u64::from(today.weekday().num_days_from_sunday());
        let start_of_week = today.checked_sub_days(Days::new(days_from_sunday))?;
        let records = self.stored_order().into_iter().flatten().collect::<Vec<_>>();

        let mut slots = Vec::with_capacity(WEEKDAY_LABELS.len());
        for (index, label) in WEEKDAY_LABELS.into_iter().enumerate() {
            let date = start_of_week.checked_add_days(Days::new(index as u64))?;
            let bedtime = records
                .iter()
                .find(|record| record.timestamp.date() == date)
                .map(|record| record.timestamp.time());
            let value = match bedtime {
                Some(time) => {
                    let hours = goal.signed_duration_since(time).num_hours() as f32;
                    (hours - CHART_MAX_VALUE).abs()
                }
                None => 0.0,
            };
            slots.push(WeekdaySlot {
                label,
                date,
                bedtime,
                value,
            });
        }
        Some(slots)
    }
}

pub fn load_history(path: &Path) -> Result<BedtimeHistory> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "history file not found, starting empty");
            return Ok(BedtimeHistory::default());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("unable to read history file {}", path.display()));
        }
    };
    parse_history_text(&content)
}

pub fn parse_history_text(content: &str) -> Result<BedtimeHistory> {
    let raw = serde_json::from_str::<HistoryFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != HISTORY_VERSION {
        bail!(
            "unsupported history version {}; expected version {HISTORY_VERSION}",
            raw.version
        );
    }

    let history = BedtimeHistory {
        entries: raw.bedtimes,
    };
    let unreadable = history
        .entries
        .iter()
        .filter(|entry| entry.parse().is_none())
        .count();
    if unreadable > 0 {
        warn!(unreadable, "history contains entries that could not be read");
    }
    Ok(history)
}

pub fn save_history(path: &Path, history: &BedtimeHistory) -> Result<()> {
    let payload = HistoryFile {
        version: HISTORY_VERSION,
        bedtimes: history.entries.clone(),
    };
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("unable to write history file {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    version: u32,
    #[serde(default)]
    bedtimes: Vec<StoredBedtime>,
}
