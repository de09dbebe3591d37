use chrono::NaiveTime;
use serde::Serialize;

use crate::settings::SleepSettings;
use crate::sleep::calculator::{elapsed_between, format_clock_time, parse_time_or_none};

/// Recommended daily sunlight, in minutes.
pub const SUNLIGHT_TARGET_MINUTES: std::ops::RangeInclusive<u32> = 10..=15;

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Tips {
    pub sunlight: String,
    pub bedtime: String,
    pub fall_asleep: Option<String>,
}

impl Tips {
    pub fn collect(settings: &SleepSettings, bedtime_goal: Option<NaiveTime>) -> Self {
        Self {
            sunlight: sunlight_tip(settings.sunlight_minutes),
            bedtime: bedtime_tip(bedtime_goal),
            fall_asleep: fall_asleep_tip(
                parse_time_or_none(settings.last_bedtime.as_deref()),
                parse_time_or_none(settings.last_sleep_onset.as_deref()),
            ),
        }
    }
}

pub fn sunlight_tip(minutes: u32) -> String {
    let lead = if SUNLIGHT_TARGET_MINUTES.contains(&minutes) {
        "You've achieved"
    } else if minutes > *SUNLIGHT_TARGET_MINUTES.end() {
        "You went above and beyond with"
    } else {
        "You currently have"
    };
    format!("{lead} {minutes} minutes of sunlight")
}

pub fn bedtime_tip(goal: Option<NaiveTime>) -> String {
    match goal {
        Some(goal) => format!(
            "Aim for a bedtime around {} to be consistent",
            format_clock_time(goal)
        ),
        None => "No bedtime estimate, check tomorrow.".to_string(),
    }
}

pub fn fall_asleep_tip(
    last_bedtime: Option<NaiveTime>,
    last_sleep_onset: Option<NaiveTime>,
) -> Option<String> {
    let difference = elapsed_between(last_bedtime?, last_sleep_onset?);
    Some(format!(
        "It took you {} minutes to fall asleep last night",
        difference.minutes
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn sunlight_tiers() {
        assert_eq!(sunlight_tip(4), "You currently have 4 minutes of sunlight");
        assert_eq!(sunlight_tip(10), "You've achieved 10 minutes of sunlight");
        assert_eq!(sunlight_tip(15), "You've achieved 15 minutes of sunlight");
        assert_eq!(
            sunlight_tip(40),
            "You went above and beyond with 40 minutes of sunlight"
        );
    }

    #[test]
    fn bedtime_tip_with_and_without_goal() {
        assert_eq!(
            bedtime_tip(Some(hm(23, 25))),
            "Aim for a bedtime around 11:25 PM to be consistent"
        );
        assert_eq!(bedtime_tip(None), "No bedtime estimate, check tomorrow.");
    }

    #[test]
    fn fall_asleep_needs_both_times() {
        assert_eq!(
            fall_asleep_tip(Some(hm(22, 30)), Some(hm(22, 47))),
            Some("It took you 18 minutes to fall asleep last night".to_string())
        );
        assert_eq!(fall_asleep_tip(None, Some(hm(22, 47))), None);
        assert_eq!(fall_asleep_tip(Some(hm(22, 30)), None), None);
    }

    #[test]
    fn collect_reads_stored_times() {
        let settings = SleepSettings {
            sunlight_minutes: 12,
            last_bedtime: Some("23:00:00".to_string()),
            last_sleep_onset: Some("23:09:30".to_string()),
            ..SleepSettings::default()
        };
        let tips = Tips::collect(&settings, None);
        assert_eq!(tips.sunlight, "You've achieved 12 minutes of sunlight");
        assert_eq!(
            tips.fall_asleep.as_deref(),
            Some("It took you 10 minutes to fall asleep last night")
        );
    }
}
