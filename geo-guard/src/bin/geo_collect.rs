//! Collects, validates and cleans the reference geography.
//!
//! Exits with status 1 when a check fails, printing the diagnostic.

use clap::Parser;
use geo_guard::logging::setup::{init_logging, LoggingConfig};
use geo_guard::prelude::*;
use geo_guard::supplier::FileSupplier;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Acquisition configuration (.json, .yaml or .yml)
    #[arg(long)]
    acquisition_config: PathBuf,

    /// Exceptions configuration (.json, .yaml or .yml)
    #[arg(long)]
    exceptions_config: PathBuf,

    /// Directory receiving the raw, amendment and cleaned snapshots
    #[arg(long)]
    working_directory: PathBuf,

    /// Delete the working directory first if it exists
    #[arg(long)]
    overwrite_working_directory: bool,

    /// Read `<dir>/<view_name>.csv` and `<dir>/laposte_hexasmal.csv` instead of querying the endpoints
    #[arg(long)]
    offline_dir: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Print the report as JSON instead of a summary
    #[arg(long)]
    json_report: bool,
}

fn supplier(args: &Args, acquisition: &AcquisitionConfig) -> Result<Box<dyn Supplier>> {
    if let Some(dir) = &args.offline_dir {
        info!(dir = %dir.display(), "Using local snapshots");
        return Ok(Box::new(FileSupplier::new(dir)));
    }
    #[cfg(feature = "http")]
    {
        let supplier = geo_guard::supplier::HttpSupplier::new(&acquisition.supplier)?
            .with_postal(&acquisition.laposte.settings())?;
        info!(
            endpoint = supplier.endpoint(),
            postal_endpoint = supplier.postal_endpoint(),
            "Using SPARQL endpoint"
        );
        Ok(Box::new(supplier))
    }
    #[cfg(not(feature = "http"))]
    {
        let _ = acquisition;
        Err(GeoError::Configuration(
            "built without the http feature; pass --offline-dir".to_string(),
        ))
    }
}

async fn collect(args: &Args) -> Result<CollectionReport> {
    let acquisition = AcquisitionConfig::from_file(&args.acquisition_config)?;
    let window = acquisition.date_window()?;
    let exceptions = ExceptionsConfig::from_file(&args.exceptions_config, &window)?;
    let log = if args.log_level >= Level::DEBUG {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let collector = Collector::new(supplier(args, &acquisition)?, acquisition, exceptions)?
        .with_log_config(log);
    collector
        .run(&args.working_directory, args.overwrite_working_directory)
        .await
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(
        LoggingConfig::default()
            .with_geo_level(args.log_level)
            .with_json_format(args.json_logs),
    )?;

    match collect(&args).await {
        Ok(report) => {
            if args.json_report {
                println!("{}", report.to_json()?);
            } else {
                print!("{report}");
            }
            Ok(())
        }
        Err(GeoError::CheckFailed(diagnostic)) => {
            error!(%diagnostic, "Collection aborted");
            eprintln!("{diagnostic}");
            process::exit(1);
        }
        Err(other) => Err(other.into()),
    }
}
