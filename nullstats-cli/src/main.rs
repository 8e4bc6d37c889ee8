//! CLI for the nullstats analytics aggregation engine.
//!
//! Provides commands for inspecting a stats directory, printing reports,
//! replaying event logs, and forcing a rollover.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use clap::{Parser, Subcommand, ValueEnum};
use nullstats::log::parse_line;
use nullstats::{Collector, CollectorConfig, Dimension, Report, Stats, Zone};
use tracing_subscriber::EnvFilter;

/// Privacy-friendly web analytics aggregation CLI.
#[derive(Parser)]
#[command(name = "nullstats", version, about)]
struct Cli {
    /// JSON collector configuration; the directory argument overrides its `dir`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display history and live log metadata.
    Info {
        /// Path to the stats directory.
        dir: PathBuf,
    },

    /// Print today's and historical stats.
    Report {
        /// Path to the stats directory.
        dir: PathBuf,

        /// Time zone for calendar days ("utc", "local", "+02:00").
        #[arg(long)]
        zone: Option<Zone>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// Rows per dimension (csv only).
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Replay event log lines through the collector.
    Ingest {
        /// Path to the stats directory.
        dir: PathBuf,

        /// Log-format input file (default: stdin).
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Fold the live log into the history now.
    Rollover {
        /// Path to the stats directory.
        dir: PathBuf,
    },
}

/// Output format for reports.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One `dimension,name,today,total` line per row.
    Csv,
    /// The full report as JSON.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Info { dir } => cmd_info(config, &dir),
        Commands::Report {
            dir,
            zone,
            format,
            top,
        } => cmd_report(config, &dir, zone, &format, top),
        Commands::Ingest { dir, input } => cmd_ingest(config, &dir, input.as_deref()),
        Commands::Rollover { dir } => cmd_rollover(config, &dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Builds the collector configuration from `--config` and the directory argument.
fn load_config(
    config_path: Option<&Path>,
    dir: &Path,
) -> Result<CollectorConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => CollectorConfig::from_json_file(path)?,
        None => CollectorConfig::new(dir),
    };
    config.dir = dir.to_path_buf();
    config.validate()?;
    Ok(config)
}

/// Implements `nullstats info <dir>`.
fn cmd_info(config_path: Option<&Path>, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path, dir)?;
    if !dir.is_dir() {
        return Err(format!("No stats directory at '{}'", dir.display()).into());
    }

    println!("Directory: {}", dir.display());
    println!("Zone: {}", config.zone);
    println!();

    let history_path = config.history_path();
    match std::fs::read_to_string(&history_path) {
        Ok(text) => {
            let history = Stats::decode(&text)?;
            println!(
                "History: {} ({})",
                history_path.display(),
                format_bytes(text.len() as u64)
            );
            println!("  Start: {}", format_start(&history));
            println!("  Interval: {}", nullstats::duration::format(history.interval));
            println!("  Days: {}", history.width());
            print_row_counts(&history);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => println!("History: none"),
        Err(e) => return Err(e.into()),
    }
    println!();

    let log_path = config.log_path();
    if log_path.exists() {
        let size = std::fs::metadata(&log_path)?.len();
        let daily = nullstats::log::parse_log(&log_path, config.zone)?;
        println!("Live log: {} ({})", log_path.display(), format_bytes(size));
        println!("  Period: {}", format_start(&daily));
        print_row_counts(&daily);
    } else {
        println!("Live log: none");
    }

    Ok(())
}

/// Implements `nullstats report <dir>`.
fn cmd_report(
    config_path: Option<&Path>,
    dir: &Path,
    zone: Option<Zone>,
    format: &OutputFormat,
    top: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path, dir)?;
    if let Some(zone) = zone {
        config.zone = zone;
    }
    let collector = Collector::new(config)?;
    let report: Report = collector.report(None)?;

    match format {
        OutputFormat::Csv => print!("{}", report_csv(&report, top)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Implements `nullstats ingest <dir>`.
fn cmd_ingest(
    config_path: Option<&Path>,
    dir: &Path,
    input: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let collector = Collector::new(load_config(config_path, dir)?)?;
    let (recorded, filtered) = match input {
        Some(path) => ingest(&collector, BufReader::new(File::open(path)?))?,
        None => ingest(&collector, io::stdin().lock())?,
    };
    collector.close()?;

    tracing::info!(recorded, filtered, "ingest complete");
    println!("Recorded {recorded} hit(s), filtered {filtered}");
    Ok(())
}

/// Implements `nullstats rollover <dir>`.
fn cmd_rollover(config_path: Option<&Path>, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let collector = Collector::new(load_config(config_path, dir)?)?;
    if collector.rollover()? {
        println!("Rolled over live log into {}", collector.config().history_path().display());
    } else {
        println!("Live log is empty, nothing to roll over");
    }
    collector.close()?;
    Ok(())
}

/// Feeds log-format lines to the collector, returning (recorded, filtered).
fn ingest<R: BufRead>(
    collector: &Collector,
    reader: R,
) -> Result<(u64, u64), Box<dyn std::error::Error>> {
    let mut recorded = 0;
    let mut filtered = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let hit = parse_line(line.trim_end_matches('\r'), i + 1)?;
        if collector.hit(&hit)? {
            recorded += 1;
        } else {
            filtered += 1;
        }
    }
    Ok((recorded, filtered))
}

/// Renders the top rows of every dimension with today's and all-time totals.
fn report_csv<E>(report: &Report<E>, top: usize) -> String {
    let mut out = String::from("dimension,name,today,total\n");
    for dimension in Dimension::ALL {
        for row in report.top(dimension, top) {
            let today = report
                .daily
                .frame(dimension)
                .get(&row.name)
                .map_or(0, nullstats::Row::total);
            out.push_str(&format!(
                "{},{},{today},{}\n",
                dimension.name(),
                row.name,
                row.total()
            ));
        }
    }
    out
}

fn print_row_counts(stats: &Stats) {
    for dimension in Dimension::ALL {
        println!(
            "  {:<10} {} row(s)",
            format!("{}:", dimension.name()),
            stats.frame(dimension).row_count()
        );
    }
}

fn format_start(stats: &Stats) -> String {
    stats.start.map_or_else(
        || "unset".to_string(),
        |start| start.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0 MB");
    }

    #[test]
    fn test_load_config_dir_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"dir": "/elsewhere", "zone": {"kind": "local"}}"#).unwrap();

        let config = load_config(Some(&path), temp_dir.path()).unwrap();
        assert_eq!(config.dir, temp_dir.path());
        assert_eq!(config.zone, Zone::Local);
    }

    #[test]
    fn test_ingest_and_report() {
        let temp_dir = tempdir().unwrap();
        let collector = Collector::new(CollectorConfig::new(temp_dir.path())).unwrap();
        let input = "1609495200,/,s1,duck.com,DE,mobile\n\
                     1609495260,/style.css,s1,,,\n\
                     \n\
                     1609498800,/about,s2,,,desktop\n";

        let (recorded, filtered) = ingest(&collector, Cursor::new(input)).unwrap();
        assert_eq!((recorded, filtered), (2, 1));

        let report: Report = collector.report(None).unwrap();
        let csv = report_csv(&report, 10);
        assert!(csv.starts_with("dimension,name,today,total\n"));
        assert!(csv.contains("paths,/,1,1\n"));
        assert!(csv.contains("sessions,sessions,2,2\n"));
        assert!(csv.contains("referrers,duck.com,1,1\n"));
        assert!(!csv.contains("style.css"));
    }

    #[test]
    fn test_ingest_rejects_malformed_line() {
        let temp_dir = tempdir().unwrap();
        let collector = Collector::new(CollectorConfig::new(temp_dir.path())).unwrap();
        assert!(ingest(&collector, Cursor::new("oops\n")).is_err());
    }
}
