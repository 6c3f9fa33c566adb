// Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "dynasty")]
#[command(about = "Dynasty fantasy football valuation, calibration and drift monitoring")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import players from a CSV file (defaults to the configured path)
    Import {
        path: Option<PathBuf>,
    },
    /// Value every player under the active parameters and store the results
    Value {
        /// Ignore league settings and use baseline valuation
        #[arg(long)]
        baseline: bool,
        /// Number of players to print
        #[arg(long, default_value_t = 25)]
        top: usize,
    },
    /// Run a calibration against current market values
    Calibrate {
        /// Promote the result if the run completes
        #[arg(long)]
        promote: bool,
    },
    /// Promote a completed calibration run's parameters
    Promote {
        run_id: Uuid,
    },
    /// Make an earlier parameter version active again
    Activate {
        version: u64,
    },
    /// List known parameter versions, marking the active one
    Versions,
    /// Run one drift check
    Drift,
    /// Run drift checks on a fixed interval until Ctrl-C
    Monitor {
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
    /// List recent calibration runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List drift alerts (unresolved only unless --all)
    Alerts {
        #[arg(long)]
        all: bool,
    },
    /// Mark a drift alert as resolved
    ResolveAlert {
        id: Uuid,
    },
}
