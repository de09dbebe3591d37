use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::history::BedtimeHistory;
use crate::settings::SleepSettings;
use crate::sleep::calculator::format_storage_time;
use crate::sleep::model::{BedtimeRecord, BedtimeSensor};

/// Device signals that feed bedtime tracking.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SensorEvent {
    BedtimeModeChanged { enabled: bool },
    PowerConnected,
    /// Minutes of sunlight reported by the companion app.
    SunlightChanged { minutes: u32 },
    /// Sleep onset detected by the health sensors; may lie in the past.
    UserAsleep { at: NaiveDateTime },
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct EventOutcome {
    pub recorded: Option<BedtimeRecord>,
    pub settings_changed: bool,
}

pub fn apply_event(
    event: SensorEvent,
    settings: &mut SleepSettings,
    history: &mut BedtimeHistory,
    now: NaiveDateTime,
) -> EventOutcome {
    let mut outcome = EventOutcome::default();
    match event {
        SensorEvent::BedtimeModeChanged { enabled } => {
            info!(enabled, "bedtime mode changed");
            if enabled {
                settings.last_bedtime = Some(format_storage_time(now.time()));
                outcome.settings_changed = true;
                outcome.recorded =
                    record_if_selected(BedtimeSensor::Bedtime, settings, history, now);
            }
        }
        SensorEvent::PowerConnected => {
            info!("power connected");
            outcome.recorded =
                record_if_selected(BedtimeSensor::Charging, settings, history, now);
        }
        SensorEvent::SunlightChanged { minutes } => {
            settings.sunlight_minutes = minutes;
            outcome.settings_changed = true;
        }
        SensorEvent::UserAsleep { at } => {
            settings.last_sleep_onset = Some(format_storage_time(at.time()));
            outcome.settings_changed = true;
        }
    }
    outcome
}

fn record_if_selected(
    sensor: BedtimeSensor,
    settings: &SleepSettings,
    history: &mut BedtimeHistory,
    now: NaiveDateTime,
) -> Option<BedtimeRecord> {
    if settings.bedtime_sensor != sensor {
        debug!(
            %sensor,
            configured = %settings.bedtime_sensor,
            "ignoring event from unselected sensor"
        );
        return None;
    }
    if let Some(window) = settings.timeframe()
        && !window.contains(now.time())
    {
        debug!(%sensor, time = %now.time(), "event outside bedtime timeframe");
        return None;
    }

    let record = BedtimeRecord::new(now, sensor);
    if history.record(record) {
        info!(%sensor, timestamp = %now, "recorded bedtime");
        Some(record)
    } else {
        None
    }
}
