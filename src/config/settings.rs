//! Runtime configuration settings

use crate::remote::DEFAULT_BASE_URL;
use std::path::PathBuf;
use std::time::Duration;

use super::cli::{Cli, Command};

/// Runtime settings for job orchestration and analysis
#[derive(Debug, Clone)]
pub struct Settings {
    /// Service endpoint
    pub base_url: String,
    /// Bearer token; required only by commands that reach the service
    pub token: Option<String>,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Per-job wait limit
    pub timeout: Duration,
    /// Limit on a single upload or download, none by default
    pub transfer_timeout: Option<Duration>,
    /// Where downloads and the summed file land
    pub output_dir: PathBuf,
    /// Passed through to job creation
    pub callback_url: Option<String>,
    /// File name of the summed output inside `output_dir`
    pub sum_filename: String,
    /// Number of analysis worker threads
    pub analysis_threads: usize,
    /// Show progress spinners
    pub show_progress: bool,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_cli(cli: &Cli) -> Self {
        let mut settings = Self {
            base_url: cli
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token: cli.token.clone().filter(|t| !t.trim().is_empty()),
            show_progress: !cli.quiet,
            ..Self::default()
        };

        if let Some(threads) = cli.threads {
            settings.analysis_threads = threads.max(1);
        }

        if let Command::Separate(args) = &cli.command {
            settings.poll_interval = Duration::from_secs(args.poll_interval);
            settings.timeout = Duration::from_secs(args.timeout);
            settings.transfer_timeout = args.transfer_timeout.map(Duration::from_secs);
            settings.output_dir = args.output.clone();
            settings.callback_url = args.callback_url.clone();
            settings.sum_filename = args.sum_file.clone();
        }

        settings
    }

    /// Full path of the summed output
    pub fn sum_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.sum_filename)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            transfer_timeout: None,
            output_dir: PathBuf::from("."),
            callback_url: None,
            sum_filename: "sum_output.wav".to_string(),
            analysis_threads: num_cpus::get().saturating_sub(1).max(1),
            show_progress: true,
        }
    }
}
