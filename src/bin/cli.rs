use std::cmp::min;
use std::fmt::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser, Subcommand};
use fitio::types::Value;
use fitio::{Activity, FitError, StreamError};
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry, fmt};

#[derive(Parser)]
#[command(name = "fitio", version, about, color = ColorChoice::Auto)]
struct Args {
    #[command(subcommand)]
    cmd: Commands,

    /// Configure diagnostic logging level
    #[clap(long, default_value_t = Level::ERROR)]
    log: Level,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// FIT activity file path
    input: PathBuf,

    /// Also list each lap's lengths and record counts
    #[clap(long, short, action)]
    laps: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise the structure of a FIT activity file
    ///
    /// Reads the file, assembles the session/lap/length hierarchy, and
    /// prints counts plus device and developer-field metadata.
    Inspect(InspectArgs),
}

fn inspect_cmd(args: InspectArgs) -> Result<String> {
    debug!("inspect args: {:?}", args);

    let res = fitio::read_activity_file(&args.input);
    let activity = match &res {
        Err(FitError::Stream(StreamError::BadHeader(_))) => {
            res.context("The <INPUT> is not a FIT file. Check that it is correct.")
        }
        Err(FitError::Stream(StreamError::BadCrc(_))) => {
            res.context("The <INPUT> file is corrupt: its checksum does not match.")
        }
        _ => res.map_err(anyhow::Error::from),
    }?;
    info!("Decoded activity from {:?}", args.input);

    generate_report(&activity, args.laps)
}

fn generate_report(activity: &Activity, with_laps: bool) -> Result<String> {
    let mut r = String::new();
    match &activity.guid {
        Some(guid) => writeln!(&mut r, "Activity {guid}")?,
        None => writeln!(&mut r, "Activity (no id)")?,
    }
    if let Some(start) = activity.start_time {
        writeln!(&mut r, "Started at {start} (FIT epoch seconds)")?;
    }
    writeln!(&mut r, "Sessions: {}", activity.sessions.len())?;

    for (i, session) in activity.sessions.iter().enumerate() {
        let n_records: usize = session
            .laps
            .iter()
            .flat_map(|lap| lap.lengths.iter())
            .map(|length| length.records.len())
            .sum();
        let sport = session
            .summary
            .get("sport")
            .and_then(Value::as_u64)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_owned());
        writeln!(
            &mut r,
            "- session {}: sport {}, {} laps, {} records",
            i + 1,
            sport,
            session.laps.len(),
            n_records,
        )?;
        if with_laps {
            for (j, lap) in session.laps.iter().enumerate() {
                let lap_records: usize =
                    lap.lengths.iter().map(|length| length.records.len()).sum();
                writeln!(
                    &mut r,
                    "  - lap {}: {} lengths, {} records",
                    j + 1,
                    lap.lengths.len(),
                    lap_records,
                )?;
            }
        }
        for device in &session.devices {
            let manufacturer = device
                .get("manufacturer")
                .and_then(Value::as_u64)
                .map(|m| m.to_string())
                .unwrap_or_else(|| "?".to_owned());
            writeln!(&mut r, "  device: manufacturer {manufacturer}")?;
        }
    }

    if !activity.field_descriptions.is_empty() {
        writeln!(
            &mut r,
            "Developer fields: {}",
            activity.field_descriptions.len()
        )?;
        let max_listing = 16usize;
        for description in activity
            .field_descriptions
            .iter()
            .take(min(max_listing, activity.field_descriptions.len()))
        {
            if let Some(Value::Text(key)) = description.get("field_key") {
                writeln!(&mut r, "- {key}")?;
            }
        }
        if activity.field_descriptions.len() > max_listing {
            writeln!(&mut r, "(and others)")?;
        }
    }
    Ok(r)
}

fn main() -> Result<()> {
    // Intentionally avoid wrapping argument parsing errors in anyhow::Result so
    // we preserve Clap's pretty formatting of usage info.
    let args = Args::parse();

    let fmt_layer = fmt::Layer::new()
        .with_target(false)
        .with_filter(LevelFilter::from_level(args.log));
    tracing::subscriber::set_global_default(Registry::default().with(fmt_layer))?;

    let report = match args.cmd {
        Commands::Inspect(sub_args) => inspect_cmd(sub_args),
    }?;

    print!("{}", report);
    Ok(())
}
