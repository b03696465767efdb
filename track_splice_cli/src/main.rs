use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use track_splice::{
    run_merge, run_retime, summarize, validate_threshold, Confirmer, DistanceModel,
    MergeCandidate, MergeConfig, MergeOutcome, RetimeConfig, SpeedSample, SpliceError,
    DEFAULT_MERGE_OUTPUT, DEFAULT_RETIME_OUTPUT,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Splice and retime GPS tracks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find where END starts inside BEGIN and splice the two tracks there
    Merge(MergeArgs),
    /// Rewrite a single track's timestamps to end at a known arrival time
    Retime(RetimeArgs),
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Track recorded first
    #[arg(value_hint = ValueHint::FilePath)]
    begin: PathBuf,

    /// Track whose first point lies somewhere along BEGIN
    #[arg(value_hint = ValueHint::FilePath)]
    end: PathBuf,

    /// Output GPX path
    #[arg(short, long, default_value = DEFAULT_MERGE_OUTPUT, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Maximum distance (meters) between a merge candidate and END's first point
    #[arg(short, long, default_value_t = 10.0)]
    threshold: f64,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct RetimeArgs {
    /// Track to retime
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Arrival time at the end of the track (RFC 3339, e.g. 2023-07-04T15:20:00Z)
    #[arg(long)]
    arrival: String,

    /// Output GPX path
    #[arg(short, long, default_value = DEFAULT_RETIME_OUTPUT, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Write per-point speeds as CSV (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    speed_csv: Option<PathBuf>,

    /// Distance model used for the speed report
    #[arg(long, value_enum, default_value_t = ModelOpt::Haversine)]
    distance_model: ModelOpt,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModelOpt {
    Haversine,
    Linear,
}

impl From<ModelOpt> for DistanceModel {
    fn from(value: ModelOpt) -> Self {
        match value {
            ModelOpt::Haversine => DistanceModel::Haversine,
            ModelOpt::Linear => DistanceModel::Linear,
        }
    }
}

/// Asks on the terminal whether a candidate is the merge point.
struct ConsoleConfirmer {
    theme: ColorfulTheme,
}

impl Confirmer for ConsoleConfirmer {
    fn confirm(&mut self, candidate: &MergeCandidate) -> track_splice::Result<bool> {
        println!();
        println!("Candidate {}", candidate);
        Confirm::with_theme(&self.theme)
            .with_prompt("Merge here?")
            .default(false)
            .interact()
            .map_err(|e| SpliceError::Confirmation(e.to_string()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Merge(args) => args.verbose,
        Command::Retime(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Merge(args) => handle_merge(args),
        Command::Retime(args) => handle_retime(args),
    }
}

fn handle_merge(args: MergeArgs) -> Result<()> {
    validate_threshold(args.threshold)?;
    let config = MergeConfig {
        begin_path: args.begin,
        end_path: args.end,
        output_path: args.output,
        threshold_m: args.threshold,
    };
    debug!("merge config: {:?}", config);

    let mut confirmer = ConsoleConfirmer {
        theme: ColorfulTheme::default(),
    };
    let outcome = run_merge(&config, &mut confirmer).with_context(|| {
        format!(
            "failed to merge {} and {}",
            config.begin_path.display(),
            config.end_path.display()
        )
    })?;

    match outcome {
        MergeOutcome::Written { path, index, points } => {
            println!(
                "Merged at begin point #{}; {} points written to {}",
                index,
                points,
                path.display()
            );
        }
        MergeOutcome::NoMatch => {
            println!(
                "No merge point confirmed within {:.1} m; nothing written. \
                 Re-run with a larger --threshold.",
                config.threshold_m
            );
        }
    }
    Ok(())
}

fn handle_retime(args: RetimeArgs) -> Result<()> {
    let arrival = parse_arrival(&args.arrival)?;
    let mut config = RetimeConfig::new(&args.input, arrival);
    config.output_path = args.output.clone();
    config.distance_model = args.distance_model.into();

    let outcome = run_retime(&config)
        .with_context(|| format!("failed to retime {}", config.input_path.display()))?;

    let summary = summarize(&outcome.speeds);
    info!(
        "Track covers {:.1} m in {:.0} s",
        summary.total_distance_m, summary.total_elapsed_s
    );
    if let (Some(speed), Some(index)) = (summary.max_speed_mps, summary.max_speed_index) {
        info!(
            "Fastest step ends at point #{}: {:.2} m/s ({:.1} km/h)",
            index,
            speed,
            speed * 3.6
        );
    }
    for sample in &outcome.speeds {
        debug!(
            "#{}: {:.2} m, {:.2} m/s",
            sample.index,
            sample.distance_m,
            sample.speed_mps.unwrap_or(f64::NAN)
        );
    }

    if let Some(path) = args.speed_csv.as_ref() {
        if path.as_os_str() == "-" {
            write_speeds_stdout(&outcome.speeds)?;
        } else {
            write_speeds_csv(&outcome.speeds, path)?;
            info!("Wrote speed report: {}", path.display());
        }
    }

    println!(
        "Retimed {} points ending {}; written to {}",
        outcome.track.len(),
        arrival.to_rfc3339(),
        outcome.path.display()
    );
    Ok(())
}

fn parse_arrival(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("--arrival must not be empty"));
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .with_context(|| format!("invalid arrival '{}': expected RFC 3339", trimmed))?;
    Ok(parsed.with_timezone(&Utc))
}

fn write_speeds_stdout(samples: &[SpeedSample]) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_speed_rows(samples, &mut writer)
}

fn write_speeds_csv(samples: &[SpeedSample], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_speed_rows(samples, &mut writer)
}

fn write_speed_rows<W: Write>(samples: &[SpeedSample], writer: &mut csv::Writer<W>) -> Result<()> {
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_accepts_offsets_and_normalizes_to_utc() {
        let parsed = parse_arrival("2023-07-04T17:20:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-07-04T15:20:00+00:00");
    }

    #[test]
    fn test_arrival_rejects_garbage() {
        assert!(parse_arrival("").is_err());
        assert!(parse_arrival("yesterday").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["track-splice", "merge", "a.gpx", "b.gpx"]).unwrap();
        let Command::Merge(args) = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(args.output, PathBuf::from("merged.gpx"));
        assert_eq!(args.threshold, 10.0);
    }

    #[test]
    fn test_merge_has_no_distance_model_flag() {
        let parsed = Cli::try_parse_from([
            "track-splice",
            "merge",
            "a.gpx",
            "b.gpx",
            "--distance-model",
            "linear",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_retime_requires_arrival() {
        assert!(Cli::try_parse_from(["track-splice", "retime", "a.gpx"]).is_err());
        let cli = Cli::try_parse_from([
            "track-splice",
            "retime",
            "a.gpx",
            "--arrival",
            "2023-07-04T15:20:00Z",
            "--speed-csv",
            "-",
        ])
        .unwrap();
        let Command::Retime(args) = cli.command else {
            panic!("expected retime");
        };
        assert_eq!(args.speed_csv, Some(PathBuf::from("-")));
        assert_eq!(args.output, PathBuf::from("retimed.gpx"));
    }

    #[test]
    fn test_speed_rows_have_header_and_blank_missing_speeds() {
        let samples = vec![
            SpeedSample {
                index: 1,
                distance_m: 2.5,
                elapsed_s: Some(1.0),
                speed_mps: Some(2.5),
                speed_kmh: Some(9.0),
            },
            SpeedSample {
                index: 2,
                distance_m: 0.0,
                elapsed_s: None,
                speed_mps: None,
                speed_kmh: None,
            },
        ];
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_speed_rows(&samples, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "index,distance_m,elapsed_s,speed_mps,speed_kmh");
        assert_eq!(lines[1], "1,2.5,1.0,2.5,9.0");
        assert_eq!(lines[2], "2,0.0,,,");
    }
}
