mod api;
mod events;
mod history;
mod prediction;
mod settings;
mod sleep;
mod tips;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{ApiServer, ApiServerConfig, ApiSharedState};
use crate::events::{SensorEvent, apply_event};
use crate::history::{BedtimeHistory, DeleteTarget, load_history, save_history};
use crate::prediction::{ComplicationData, ComplicationType, SleepPrediction};
use crate::settings::{load_settings, save_settings};
use crate::sleep::calculator::{
    format_clock_time, format_day, format_day_time, parse_date_time_strict, parse_time_strict,
};
use crate::sleep::model::BedtimeSensor;
use crate::tips::Tips;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliComplicationType {
    ShortText,
    LongText,
    RangedValue,
    MonochromaticImage,
    SmallImage,
}

impl From<CliComplicationType> for ComplicationType {
    fn from(value: CliComplicationType) -> Self {
        match value {
            CliComplicationType::ShortText => ComplicationType::ShortText,
            CliComplicationType::LongText => ComplicationType::LongText,
            CliComplicationType::RangedValue => ComplicationType::RangedValue,
            CliComplicationType::MonochromaticImage => ComplicationType::MonochromaticImage,
            CliComplicationType::SmallImage => ComplicationType::SmallImage,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sleeptools",
    version,
    about = "Sleep prediction, bedtime history and complication data"
)]
struct Cli {
    #[arg(long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    #[arg(long, global = true, default_value = "history.json")]
    history: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Time left to sleep before the next wake time.
    Predict {
        #[arg(long, value_parser = parse_time_arg)]
        now: Option<NaiveTime>,

        #[arg(long, value_parser = parse_time_arg)]
        next_alarm: Option<NaiveTime>,
    },
    /// Complication payload as JSON.
    Complication {
        #[arg(long, value_enum, default_value_t = CliComplicationType::ShortText)]
        kind: CliComplicationType,

        #[arg(long, value_parser = parse_time_arg)]
        now: Option<NaiveTime>,

        #[arg(long, value_parser = parse_time_arg)]
        next_alarm: Option<NaiveTime>,

        #[arg(long)]
        preview: bool,
    },
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Feed a device signal into bedtime tracking.
    Event {
        #[command(subcommand)]
        event: EventCommand,
    },
    Tips,
    /// Serve predictions over a local HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        #[arg(long, default_value_t = 8097)]
        port: u16,

        #[arg(long, value_parser = parse_time_arg)]
        next_alarm: Option<NaiveTime>,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Average,
    /// Consistency chart for the week containing `--today`.
    Week {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Delete one bedtime by timestamp, or `all`.
    Delete { target: String },
}

#[derive(Subcommand, Debug)]
enum EventCommand {
    BedtimeMode {
        #[arg(long)]
        disabled: bool,

        #[arg(long, value_parser = parse_datetime_arg)]
        at: Option<NaiveDateTime>,
    },
    PowerConnected {
        #[arg(long, value_parser = parse_datetime_arg)]
        at: Option<NaiveDateTime>,
    },
    Sunlight { minutes: u32 },
    Asleep {
        #[arg(long, value_parser = parse_datetime_arg)]
        at: NaiveDateTime,
    },
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sleeptools=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli.settings)
        .with_context(|| format!("failed to load {}", cli.settings.display()))?;
    let history = load_history(&cli.history)
        .with_context(|| format!("failed to load {}", cli.history.display()))?;

    match cli.command {
        Command::Predict { now, next_alarm } => {
            let now = now.unwrap_or_else(|| Local::now().time());
            let prediction =
                SleepPrediction::compute(&settings, next_alarm, now, history.average_bedtime());
            println!("Sleep Prediction");
            println!("{}", prediction.headline());
            println!("{}", prediction.status_line());
        }
        Command::Complication {
            kind,
            now,
            next_alarm,
            preview,
        } => {
            let data = if preview {
                ComplicationData::preview(kind.into())
            } else {
                let now = now.unwrap_or_else(|| Local::now().time());
                let prediction = SleepPrediction::compute(&settings, next_alarm, now, None);
                ComplicationData::build(prediction.sleep_time, kind.into())
            };
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::History { action } => run_history(action, history, &cli.history)?,
        Command::Event { event } => {
            let (event, now) = match event {
                EventCommand::BedtimeMode { disabled, at } => {
                    (SensorEvent::BedtimeModeChanged { enabled: !disabled }, at)
                }
                EventCommand::PowerConnected { at } => (SensorEvent::PowerConnected, at),
                EventCommand::Sunlight { minutes } => {
                    (SensorEvent::SunlightChanged { minutes }, None)
                }
                EventCommand::Asleep { at } => (SensorEvent::UserAsleep { at }, None),
            };
            let now = now.unwrap_or_else(|| Local::now().naive_local());
            let mut settings = settings;
            let mut history = history;
            let outcome = apply_event(event, &mut settings, &mut history, now);
            if outcome.settings_changed {
                save_settings(&cli.settings, &settings)?;
            }
            match outcome.recorded {
                Some(record) => {
                    save_history(&cli.history, &history)?;
                    println!(
                        "Recorded bedtime {} ({})",
                        format_day_time(record.timestamp),
                        sensor_label(record.sensor)
                    );
                }
                None => println!("No bedtime recorded"),
            }
        }
        Command::Tips => {
            let tips = Tips::collect(&settings, history.average_bedtime());
            println!("{}", tips.sunlight);
            println!("{}", tips.bedtime);
            if let Some(fall_asleep) = tips.fall_asleep {
                println!("{fall_asleep}");
            }
        }
        Command::Serve {
            bind,
            port,
            next_alarm,
        } => {
            let server = ApiServer::start(
                ApiServerConfig {
                    bind_addr: bind.clone(),
                    port,
                },
                ApiSharedState::new(settings, history, next_alarm),
            )
            .with_context(|| format!("failed to start local API at {bind}:{port}"))?;
            println!("Serving sleep predictions on http://{bind}:{port}/v1/prediction");
            server.wait();
        }
    }
    Ok(())
}

fn run_history(
    action: HistoryAction,
    mut history: BedtimeHistory,
    path: &Path,
) -> Result<()> {
    match action {
        HistoryAction::List => {
            if history.is_empty() {
                println!("No history");
                return Ok(());
            }
            for entry in history.newest_first() {
                match entry {
                    Some(record) => println!(
                        "{:<8}{:<10}{}",
                        format_day(record.timestamp),
                        format_clock_time(record.timestamp.time()),
                        sensor_label(record.sensor)
                    ),
                    None => println!("(unreadable entry)"),
                }
            }
        }
        HistoryAction::Average => match history.average_bedtime() {
            Some(average) => {
                println!("Average bedtime: {}", format_clock_time(average));
                if let Some(recent) = history.recent_average_bedtime() {
                    println!("Last seven nights: {}", format_clock_time(recent));
                }
            }
            None => println!("No bedtime estimate, check tomorrow."),
        },
        HistoryAction::Week { today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            match history.week_consistency(today, history.average_bedtime()) {
                Some(slots) if slots.iter().any(|slot| slot.bedtime.is_some()) => {
                    for slot in slots {
                        let bedtime = slot
                            .bedtime
                            .map(format_clock_time)
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{} {}  {:<9}{:.0}",
                            slot.label, slot.date, bedtime, slot.value
                        );
                    }
                }
                _ => println!("No data this week"),
            }
        }
        HistoryAction::Delete { target } => {
            let target = target
                .parse::<DeleteTarget>()
                .with_context(|| format!("invalid delete target '{target}'"))?;
            let removed = history.delete(target);
            if removed == 0 {
                bail!("no bedtime matches '{}'", describe_target(target));
            }
            save_history(path, &history)?;
            println!("Deleted {removed} bedtime(s)");
        }
    }
    Ok(())
}

fn describe_target(target: DeleteTarget) -> String {
    match target {
        DeleteTarget::All => "all".to_string(),
        DeleteTarget::Entry(timestamp) => format_day_time(timestamp),
    }
}

fn sensor_label(sensor: BedtimeSensor) -> &'static str {
    match sensor {
        BedtimeSensor::Bedtime => "bedtime mode",
        BedtimeSensor::Charging => "charging",
    }
}

fn parse_time_arg(input: &str) -> Result<NaiveTime, String> {
    parse_time_strict(input).map_err(|err| err.to_string())
}

fn parse_datetime_arg(input: &str) -> Result<NaiveDateTime, String> {
    parse_date_time_strict(input).map_err(|err| err.to_string())
}
