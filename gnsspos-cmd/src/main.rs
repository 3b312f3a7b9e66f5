mod average;
mod info;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use gnsspos::pos::QualityPolicy;
use gnsspos::timescale::{TimeScales, DEFAULT_LEAP_SECONDS};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Average a trajectory over each point occupied in a link log.
    ///
    /// Writes one CSV row per point with the mean and standard deviation of latitude,
    /// longitude, and ellipsoidal height of the solutions within the occupation window.
    Average {
        /// Link log field separator.
        #[arg(short, long, default_value_t = gnsspos::occupation::DEFAULT_SEPARATOR)]
        sep: char,

        /// Use all solutions. By default only fixed (Q=1) solutions are used.
        #[arg(long, action)]
        all: bool,

        /// Skip points with no solutions in their window rather than failing.
        #[arg(long, action)]
        skip_empty: bool,

        /// Fail on quality codes outside 1-6 rather than warning.
        #[arg(long, action)]
        reject_bad_quality: bool,

        /// Number of threads used to process points. Defaults to the number of CPUs.
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        #[command(flatten)]
        time: TimeArgs,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, default_value = "averaged.csv", value_name = "path")]
        output: PathBuf,

        /// RTKLIB .pos trajectory file.
        pos: PathBuf,

        /// Stonex link log file.
        link: PathBuf,
    },
    /// Show information about a .pos trajectory file
    Info {
        /// Input .pos file
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        #[command(flatten)]
        time: TimeArgs,
    },
}

#[derive(Args)]
struct TimeArgs {
    /// GPST - UTC in seconds.
    #[arg(long, default_value_t = DEFAULT_LEAP_SECONDS, value_name = "seconds")]
    leap_seconds: i32,

    /// IANA time zone for civil timestamps.
    #[arg(long, default_value = "Europe/Rome", value_parser = parse_zone, value_name = "zone")]
    zone: Tz,
}

impl TimeArgs {
    fn time_scales(&self) -> TimeScales {
        TimeScales::builder()
            .leap_seconds(self.leap_seconds)
            .civil_zone(self.zone)
            .build()
    }
}

fn parse_zone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>()
        .map_err(|e| format!("{s} is not a valid IANA time zone: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("GNSSPOS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Average {
            sep,
            all,
            skip_empty,
            reject_bad_quality,
            threads,
            time,
            clobber,
            output,
            pos,
            link,
        } => {
            let quality_policy = if *reject_bad_quality {
                QualityPolicy::Reject
            } else {
                QualityPolicy::Tolerate
            };
            average::average(&average::Opts {
                pos,
                link,
                sep: *sep,
                only_fixed: !all,
                skip_empty: *skip_empty,
                quality_policy,
                threads: *threads,
                time_scales: time.time_scales(),
                output,
                clobber: *clobber,
            })
        }
        Commands::Info {
            input,
            format,
            time,
        } => info::info(input, format, &time.time_scales()),
    }
}

#[cfg(test)]
pub(crate) fn fixture_path(name: &str) -> PathBuf {
    [env!("CARGO_MANIFEST_DIR"), "..", "gnsspos-lib", "tests", "fixtures", name]
        .iter()
        .collect()
}
