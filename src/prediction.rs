use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::Serialize;
use tracing::debug;

use crate::settings::SleepSettings;
use crate::sleep::calculator::{
    classify_sleep_quality, format_clock_time, resolve_wake_time, time_until,
};
use crate::sleep::model::{SleepQuality, TimeDifference, WakeTimeSource};

/// Hours of sleep the ranged complication treats as a full bar.
pub const DEFAULT_GOAL_HOURS: f32 = 8.0;
pub const CONTENT_DESCRIPTION: &str = "Sleep Prediction";

#[derive(Debug, Clone, Serialize)]
pub struct SleepPrediction {
    pub wake_time: NaiveTime,
    pub wake_source: WakeTimeSource,
    pub sleep_time: TimeDifference,
    pub quality: SleepQuality,
    pub bedtime_goal: Option<NaiveTime>,
}

impl SleepPrediction {
    pub fn compute(
        settings: &SleepSettings,
        next_alarm: Option<NaiveTime>,
        now: NaiveTime,
        bedtime_goal: Option<NaiveTime>,
    ) -> Self {
        let (wake_time, wake_source) = resolve_wake_time(
            settings.use_alarm,
            next_alarm,
            settings.wake_time.as_deref(),
            SleepSettings::default_wake_time(),
        );
        let sleep_time = time_until(wake_time, now);
        let quality = classify_sleep_quality(sleep_time);
        debug!(%wake_time, ?wake_source, ?sleep_time, ?quality, "computed sleep prediction");
        Self {
            wake_time,
            wake_source,
            sleep_time,
            quality,
            bedtime_goal,
        }
    }

    /// `8hr 31min`
    pub fn headline(&self) -> String {
        format!(
            "{}hr {}min",
            self.sleep_time.hours, self.sleep_time.minutes
        )
    }

    /// `Good • 7:30 AM wake up (alarm)`
    pub fn status_line(&self) -> String {
        let suffix = match self.wake_source {
            WakeTimeSource::SystemAlarm => " (alarm)",
            WakeTimeSource::UserDefined => "",
        };
        format!(
            "{} \u{2022} {} wake up{suffix}",
            self.quality.title(),
            format_clock_time(self.wake_time)
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ComplicationType {
    ShortText,
    LongText,
    RangedValue,
    MonochromaticImage,
    SmallImage,
}

impl ComplicationType {
    pub fn as_token(self) -> &'static str {
        match self {
            ComplicationType::ShortText => "short_text",
            ComplicationType::LongText => "long_text",
            ComplicationType::RangedValue => "ranged_value",
            ComplicationType::MonochromaticImage => "monochromatic_image",
            ComplicationType::SmallImage => "small_image",
        }
    }
}

impl fmt::Display for ComplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for ComplicationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "short_text" => Ok(ComplicationType::ShortText),
            "long_text" => Ok(ComplicationType::LongText),
            "ranged_value" => Ok(ComplicationType::RangedValue),
            "monochromatic_image" => Ok(ComplicationType::MonochromaticImage),
            "small_image" => Ok(ComplicationType::SmallImage),
            other => Err(format!("unknown complication type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComplicationData {
    ShortText {
        text: String,
        content_description: &'static str,
    },
    LongText {
        text: String,
        content_description: &'static str,
    },
    RangedValue {
        min: f32,
        max: f32,
        value: f32,
        text: String,
        content_description: &'static str,
    },
    MonochromaticImage {
        content_description: &'static str,
    },
    SmallImage {
        content_description: &'static str,
    },
}

impl ComplicationData {
    pub fn build(sleep_time: TimeDifference, kind: ComplicationType) -> Self {
        let short_text = format!("{}h", sleep_time.hours);
        let long_text = format!("{}m", sleep_time.minutes);
        let goal_progress = sleep_time.hours as f32 / DEFAULT_GOAL_HOURS;
        debug!(goal_progress, %kind, "building complication");

        match kind {
            ComplicationType::ShortText => ComplicationData::ShortText {
                text: short_text,
                content_description: CONTENT_DESCRIPTION,
            },
            ComplicationType::LongText => ComplicationData::LongText {
                text: format!("{short_text} {long_text}"),
                content_description: CONTENT_DESCRIPTION,
            },
            ComplicationType::RangedValue => ComplicationData::RangedValue {
                min: 0.0,
                max: goal_progress.max(1.0),
                value: goal_progress,
                text: short_text,
                content_description: CONTENT_DESCRIPTION,
            },
            ComplicationType::MonochromaticImage => ComplicationData::MonochromaticImage {
                content_description: CONTENT_DESCRIPTION,
            },
            ComplicationType::SmallImage => ComplicationData::SmallImage {
                content_description: CONTENT_DESCRIPTION,
            },
        }
    }

    /// Placeholder shown in the watch-face picker.
    pub fn preview(kind: ComplicationType) -> Self {
        Self::build(TimeDifference::new(8, 5), kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn prediction_uses_system_alarm_when_enabled() {
        let settings = SleepSettings::default();
        let prediction = SleepPrediction::compute(&settings, Some(hm(7, 30)), hm(23, 0), None);
        assert_eq!(prediction.wake_source, WakeTimeSource::SystemAlarm);
        assert_eq!(prediction.sleep_time, TimeDifference::new(8, 31));
        assert_eq!(prediction.quality, SleepQuality::Good);
        assert_eq!(prediction.headline(), "8hr 31min");
        assert_eq!(prediction.status_line(), "Good \u{2022} 7:30 AM wake up (alarm)");
    }

    #[test]
    fn prediction_without_alarm_uses_configured_time() {
        let settings = SleepSettings {
            use_alarm: false,
            wake_time: Some("06:00".to_string()),
            ..SleepSettings::default()
        };
        let prediction = SleepPrediction::compute(&settings, Some(hm(9, 0)), hm(23, 30), None);
        assert_eq!(prediction.wake_time, hm(6, 0));
        assert_eq!(prediction.wake_source, WakeTimeSource::UserDefined);
        assert_eq!(prediction.sleep_time, TimeDifference::new(6, 31));
        assert_eq!(prediction.quality, SleepQuality::Poor);
        assert_eq!(prediction.status_line(), "Poor \u{2022} 6:00 AM wake up");
    }

    #[test]
    fn short_and_long_text() {
        let sleep_time = TimeDifference::new(7, 12);
        assert_eq!(
            ComplicationData::build(sleep_time, ComplicationType::ShortText),
            ComplicationData::ShortText {
                text: "7h".to_string(),
                content_description: CONTENT_DESCRIPTION,
            }
        );
        assert_eq!(
            ComplicationData::build(sleep_time, ComplicationType::LongText),
            ComplicationData::LongText {
                text: "7h 12m".to_string(),
                content_description: CONTENT_DESCRIPTION,
            }
        );
    }

    #[test]
    fn ranged_value_grows_max_past_goal() {
        let under = ComplicationData::build(TimeDifference::new(4, 0), ComplicationType::RangedValue);
        let ComplicationData::RangedValue { max, value, .. } = under else {
            panic!("expected ranged value");
        };
        assert_eq!(value, 0.5);
        assert_eq!(max, 1.0);

        let over =
            ComplicationData::build(TimeDifference::new(10, 0), ComplicationType::RangedValue);
        let ComplicationData::RangedValue { max, value, .. } = over else {
            panic!("expected ranged value");
        };
        assert_eq!(value, 1.25);
        assert_eq!(max, 1.25);
    }

    #[test]
    fn preview_shows_eight_hours_five_minutes() {
        assert_eq!(
            ComplicationData::preview(ComplicationType::LongText),
            ComplicationData::LongText {
                text: "8h 5m".to_string(),
                content_description: CONTENT_DESCRIPTION,
            }
        );
    }

    #[test]
    fn complication_type_tokens() {
        assert_eq!(
            "ranged-value".parse::<ComplicationType>(),
            Ok(ComplicationType::RangedValue)
        );
        assert_eq!(
            "short_text".parse::<ComplicationType>(),
            Ok(ComplicationType::ShortText)
        );
        assert!("gauge".parse::<ComplicationType>().is_err());
    }

    #[test]
    fn complication_serializes_with_type_tag() {
        let json = serde_json::to_value(ComplicationData::build(
            TimeDifference::new(8, 5),
            ComplicationType::ShortText,
        ))
        .expect("serialize");
        assert_eq!(json["type"], "short_text");
        assert_eq!(json["text"], "8h");
    }
}
