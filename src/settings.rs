use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::sleep::calculator::parse_time;
use crate::sleep::model::BedtimeSensor;

pub const SETTINGS_VERSION: u32 = 1;
pub const DEFAULT_WAKE_TIME: &str = "10:00";
pub const DEFAULT_BEDTIME_START: &str = "20:00";
pub const DEFAULT_BEDTIME_END: &str = "04:00";

/// User preferences as stored on disk. Time fields stay raw strings and are
/// parsed with fallbacks where they are consumed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SleepSettings {
    pub wake_time: Option<String>,
    pub use_alarm: bool,
    pub use_alerts: bool,
    pub bedtime_sensor: BedtimeSensor,
    pub bedtime_timeframe: bool,
    pub bedtime_start: Option<String>,
    pub bedtime_end: Option<String>,
    pub sunlight_minutes: u32,
    pub last_bedtime: Option<String>,
    pub last_sleep_onset: Option<String>,
}

impl Default for SleepSettings {
    fn default() -> Self {
        Self {
            wake_time: Some(DEFAULT_WAKE_TIME.to_string()),
            use_alarm: true,
            use_alerts: true,
            bedtime_sensor: BedtimeSensor::Bedtime,
            bedtime_timeframe: true,
            bedtime_start: Some(DEFAULT_BEDTIME_START.to_string()),
            bedtime_end: Some(DEFAULT_BEDTIME_END.to_string()),
            sunlight_minutes: 0,
            last_bedtime: None,
            last_sleep_onset: None,
        }
    }
}

impl SleepSettings {
    pub fn default_wake_time() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn wake_time_or_default(&self) -> NaiveTime {
        parse_time(self.wake_time.as_deref(), Some(Self::default_wake_time()))
    }

    /// Window during which bedtime events are recorded, or `None` when the
    /// window is switched off and every event counts.
    pub fn timeframe(&self) -> Option<BedtimeWindow> {
        if !self.bedtime_timeframe {
            return None;
        }
        let start = parse_time(
            self.bedtime_start.as_deref(),
            NaiveTime::from_hms_opt(20, 0, 0),
        );
        let end = parse_time(self.bedtime_end.as_deref(), NaiveTime::from_hms_opt(4, 0, 0));
        Some(BedtimeWindow { start, end })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BedtimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BedtimeWindow {
    /// Inclusive on both ends; a start later than the end spans midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

pub fn load_settings(path: &Path) -> Result<SleepSettings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "settings file not found, using defaults");
            return Ok(SleepSettings::default());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("unable to read settings file {}", path.display()));
        }
    };
    parse_settings_text(&content)
}

pub fn parse_settings_text(content: &str) -> Result<SleepSettings> {
    let raw = serde_json::from_str::<SettingsFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != SETTINGS_VERSION {
        bail!(
            "unsupported settings version {}; expected version {SETTINGS_VERSION}",
            raw.version
        );
    }

    Ok(SleepSettings {
        wake_time: raw.wake_time,
        use_alarm: raw.use_alarm,
        use_alerts: raw.use_alerts,
        bedtime_sensor: BedtimeSensor::from_token_lenient(&raw.bedtime_sensor),
        bedtime_timeframe: raw.bedtime_timeframe,
        bedtime_start: raw.bedtime_start,
        bedtime_end: raw.bedtime_end,
        sunlight_minutes: raw.sunlight_minutes,
        last_bedtime: raw.last_bedtime,
        last_sleep_onset: raw.last_sleep_onset,
    })
}

pub fn save_settings(path: &Path, settings: &SleepSettings) -> Result<()> {
    let payload = json!({
        "version": SETTINGS_VERSION,
        "wake_time": settings.wake_time,
        "use_alarm": settings.use_alarm,
        "use_alerts": settings.use_alerts,
        "bedtime_sensor": settings.bedtime_sensor.as_token(),
        "bedtime_timeframe": settings.bedtime_timeframe,
        "bedtime_start": settings.bedtime_start,
        "bedtime_end": settings.bedtime_end,
        "sunlight_minutes": settings.sunlight_minutes,
        "last_bedtime": settings.last_bedtime,
        "last_sleep_onset": settings.last_sleep_onset,
    });
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("unable to write settings file {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    version: u32,
    #[serde(default = "default_wake_time")]
    wake_time: Option<String>,
    #[serde(default = "default_true")]
    use_alarm: bool,
    #[serde(default = "default_true")]
    use_alerts: bool,
    #[serde(default = "default_bedtime_sensor")]
    bedtime_sensor: String,
    #[serde(default = "default_true")]
    bedtime_timeframe: bool,
    #[serde(default = "default_bedtime_start")]
    bedtime_start: Option<String>,
    #[serde(default = "default_bedtime_end")]
    bedtime_end: Option<String>,
    #[serde(default)]
    sunlight_minutes: u32,
    #[serde(default)]
    last_bedtime: Option<String>,
    #[serde(default)]
    last_sleep_onset: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_wake_time() -> Option<String> {
    Some(DEFAULT_WAKE_TIME.to_string())
}

fn default_bedtime_sensor() -> String {
    BedtimeSensor::Bedtime.as_token().to_string()
}

fn default_bedtime_start() -> Option<String> {
    Some(DEFAULT_BEDTIME_START.to_string())
}

fn default_bedtime_end() -> Option<String> {
    Some(DEFAULT_BEDTIME_END.to_string())
}
