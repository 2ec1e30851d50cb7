use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use cx_core::{ExportFormat, JobId};

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload chart images and fetch the extracted data", long_about = None)]
pub struct Args {
    /// Base URL of the chart API, including its path prefix.
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Poll interval while watching a job, in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Per-request timeout, in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_url: self.api_url.clone(),
            interval_ms: self.interval_ms,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the session and forget the stored token
    Logout,
    /// Show the logged-in user
    Me,
    /// Upload a chart image and wait for extraction
    Upload {
        file: PathBuf,
        /// Return right after the upload instead of watching the job.
        #[arg(long)]
        no_wait: bool,
    },
    /// Poll an existing job until it finishes
    Watch { id: JobId },
    /// Show a job with its result
    Show { id: JobId },
    /// List jobs
    List {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Delete a job
    Delete {
        id: JobId,
        #[arg(long)]
        yes: bool,
    },
    /// Download a diagnostic artifact image
    Artifact {
        id: JobId,
        key: String,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Download the uploaded image
    Original {
        id: JobId,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Export extracted points
    Export {
        id: JobId,
        #[arg(long, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Render from the normalized result instead of the server export.
        #[arg(long)]
        local: bool,
        /// Only export this series.
        #[arg(long)]
        series: Option<String>,
        /// Write here instead of chart_{id}.{ext}; "-" prints to stdout.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}
