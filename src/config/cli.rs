//! CLI argument parsing and configuration

use crate::remote::{Model, OutputFormat, Variant};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// stemflow - Remote stem separation jobs and audio similarity search
///
/// Uploads audio to the separation service, runs one or more models against
/// it concurrently and downloads the stems. Also finds similar-sounding files
/// and mixes or level-matches local audio.
#[derive(Parser, Debug)]
#[command(name = "stemflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// API token for the separation service
    #[arg(long, env = "AUDIOSHAKE_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Base URL of the separation service
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Number of analysis worker threads (defaults to CPU count - 1)
    #[arg(short = 'j', long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress progress spinners)
    #[arg(short, long, default_value = "false", global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file once and run one job per model concurrently
    Separate(SeparateArgs),
    /// Rank files in a directory by similarity to an input file
    Similar(SimilarArgs),
    /// Sum (overlay) several audio files into one
    Sum(SumArgs),
    /// Scale a file so its RMS level matches a reference
    MatchVolume(MatchVolumeArgs),
}

#[derive(Args, Debug)]
pub struct SeparateArgs {
    /// Input audio file
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Model to run (repeat for several concurrent jobs)
    #[arg(short, long = "model", value_name = "MODEL", required = true)]
    pub models: Vec<Model>,

    /// Output format for every job
    #[arg(short, long, value_name = "FORMAT", default_value = "wav")]
    pub format: OutputFormat,

    /// Model variant (e.g. high_quality, two_speaker, n_speaker)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<Variant>,

    /// Also download the residual (mixture minus target)
    #[arg(long, default_value = "false")]
    pub residual: bool,

    /// Directory for downloaded outputs
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Seconds between status polls
    #[arg(long, value_name = "SECS", default_value = "5")]
    pub poll_interval: u64,

    /// Seconds to wait for each job before giving up
    #[arg(long, value_name = "SECS", default_value = "600")]
    pub timeout: u64,

    /// Seconds allowed for each upload or download; unlimited when omitted
    #[arg(long, value_name = "SECS")]
    pub transfer_timeout: Option<u64>,

    /// URL the service calls when a job finishes
    #[arg(long, value_name = "URL")]
    pub callback_url: Option<String>,

    /// Gain in dB applied to a model's outputs before summing (e.g. bass=-8)
    #[arg(long, value_name = "MODEL=DB", value_parser = parse_gain)]
    pub gain: Vec<(Model, f64)>,

    /// Sum all downloaded outputs into one file
    #[arg(long, default_value = "false")]
    pub sum: bool,

    /// Filename for the summed output
    #[arg(long, value_name = "NAME", default_value = "sum_output.wav")]
    pub sum_file: String,
}

#[derive(Args, Debug)]
pub struct SimilarArgs {
    /// Reference audio file
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Directory of candidate files
    #[arg(short, long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Minimum similarity in [0, 1]
    #[arg(short, long, default_value = "0.7")]
    pub threshold: f64,

    /// Number of MFCC coefficients
    #[arg(long, default_value = "20")]
    pub mfcc: usize,

    /// Normalize input with an external ffmpeg instead of the built-in decoder
    #[arg(long, default_value = "false")]
    pub ffmpeg: bool,
}

#[derive(Args, Debug)]
pub struct SumArgs {
    /// Files to sum
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Output WAV file
    #[arg(short, long, value_name = "FILE", default_value = "sum_output.wav")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct MatchVolumeArgs {
    /// File whose level is adjusted
    #[arg(long, value_name = "FILE")]
    pub source: PathBuf,

    /// Reference file
    #[arg(long, value_name = "FILE")]
    pub target: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

/// Parse `model=db`
fn parse_gain(s: &str) -> Result<(Model, f64), String> {
    let (model, db) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MODEL=DB, got '{}'", s))?;
    let model = model.parse::<Model>().map_err(|e| e.to_string())?;
    let db = db
        .parse::<f64>()
        .map_err(|e| format!("invalid gain '{}': {}", db, e))?;
    Ok((model, db))
}

impl Cli {
    /// Get the log level based on verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gain() {
        assert_eq!(parse_gain("bass=-8").unwrap(), (Model::Bass, -8.0));
        assert!(parse_gain("bass").is_err());
        assert!(parse_gain("kazoo=1").is_err());
    }

    #[test]
    fn test_parse_separate_command() {
        let cli = Cli::try_parse_from([
            "stemflow", "separate", "-i", "song.mp3", "-m", "bass", "-m", "drums",
            "--format", "mp3", "--sum", "--gain", "drums=3", "--token", "t",
        ])
        .unwrap();
        match cli.command {
            Command::Separate(args) => {
                assert_eq!(args.models, vec![Model::Bass, Model::Drums]);
                assert_eq!(args.format, OutputFormat::Mp3);
                assert!(args.sum);
                assert_eq!(args.gain, vec![(Model::Drums, 3.0)]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.token.as_deref(), Some("t"));
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::try_parse_from(["stemflow", "-vv", "sum", "a.wav", "b.wav"]).unwrap();
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }
}
