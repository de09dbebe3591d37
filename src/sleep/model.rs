use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Whole hours and minutes until (or since) a time-of-day.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct TimeDifference {
    pub hours: u32,
    pub minutes: u32,
}

impl TimeDifference {
    pub const fn new(hours: u32, minutes: u32) -> Self {
        Self { hours, minutes }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeTimeSource {
    SystemAlarm,
    UserDefined,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SleepQuality {
    Good,
    Medium,
    Poor,
}

impl SleepQuality {
    pub fn title(self) -> &'static str {
        match self {
            SleepQuality::Good => "Good",
            SleepQuality::Medium => "Fair",
            SleepQuality::Poor => "Poor",
        }
    }

    /// Accent color used by the watch face for this tier.
    pub fn color_hex(self) -> &'static str {
        match self {
            SleepQuality::Good => "#71b219",
            SleepQuality::Medium | SleepQuality::Poor => "#efa300",
        }
    }
}

/// Which detection mechanism produced a bedtime record.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedtimeSensor {
    Bedtime,
    Charging,
}

impl BedtimeSensor {
    pub fn as_token(self) -> &'static str {
        match self {
            BedtimeSensor::Bedtime => "BEDTIME",
            BedtimeSensor::Charging => "CHARGING",
        }
    }

    /// Any token other than `BEDTIME` selects the charging sensor.
    pub fn from_token_lenient(token: &str) -> Self {
        if token == "BEDTIME" {
            BedtimeSensor::Bedtime
        } else {
            BedtimeSensor::Charging
        }
    }
}

impl fmt::Display for BedtimeSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for BedtimeSensor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BEDTIME" => Ok(BedtimeSensor::Bedtime),
            "CHARGING" => Ok(BedtimeSensor::Charging),
            other => Err(format!("unknown bedtime sensor '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct BedtimeRecord {
    pub timestamp: NaiveDateTime,
    pub sensor: BedtimeSensor,
}

impl BedtimeRecord {
    pub fn new(timestamp: NaiveDateTime, sensor: BedtimeSensor) -> Self {
        Self { timestamp, sensor }
    }
}
