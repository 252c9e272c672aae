//! stemflow CLI entry point

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use stemflow::analysis::{Normalizer, SimilarityRanker, SpectralFeatureExtractor};
use stemflow::audio::{mixer, DecodeNormalizer, FfmpegNormalizer};
use stemflow::config::cli::{MatchVolumeArgs, SeparateArgs, SimilarArgs, SumArgs};
use stemflow::config::{Cli, Command, Settings};
use stemflow::pipeline::{GainProcessor, JobRunner, PostProcessMap, PostProcessor};
use stemflow::remote::{HttpJobService, JobMetadata};
use stemflow::{Result, StemflowError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    // Build settings from CLI
    let settings = Settings::from_cli(&cli);

    let outcome = match &cli.command {
        Command::Separate(args) => run_separate(args, settings),
        Command::Similar(args) => run_similar(args, &settings),
        Command::Sum(args) => run_sum(args),
        Command::MatchVolume(args) => run_match_volume(args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            if e.is_job_error() {
                eprintln!("  Rerun with -v to see each request and poll");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        "error".to_string()
    } else {
        cli.log_level().to_string().to_lowercase()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn run_separate(args: &SeparateArgs, settings: Settings) -> Result<ExitCode> {
    let token = settings.token.clone().ok_or_else(|| {
        StemflowError::ConfigError(
            "No API token. Set AUDIOSHAKE_TOKEN or pass --token".to_string(),
        )
    })?;

    let jobs: Vec<JobMetadata> = args
        .models
        .iter()
        .map(|&model| {
            let meta = JobMetadata::new(model, args.format).with_residual(args.residual);
            match args.variant {
                Some(variant) => meta.with_variant(variant),
                None => meta,
            }
        })
        .collect();

    let mut post_process = PostProcessMap::new();
    for &(model, gain_db) in &args.gain {
        post_process.insert(
            model,
            Arc::new(GainProcessor::new(gain_db)) as Arc<dyn PostProcessor>,
        );
    }

    let service = HttpJobService::new(&settings.base_url, token)?
        .with_transfer_timeout(settings.transfer_timeout);
    let runner = JobRunner::new(Arc::new(service), settings);
    let batch = runner.run_jobs_concurrently(&args.input, &jobs, &post_process, args.sum)?;

    println!();
    for outcome in &batch.outcomes {
        match &outcome.result {
            Ok(result) => {
                println!(
                    "✓ {} (job {}, {:.1}s)",
                    outcome.metadata.name,
                    result.job.id,
                    result.elapsed.as_secs_f64()
                );
                for file in &result.files {
                    println!("    {}", file.display());
                }
            }
            Err(e) => println!("✗ {}: {}", outcome.metadata.name, e),
        }
    }
    if let Some(summed) = &batch.summed {
        println!("Mix written to {}", summed.display());
    }
    if let Some(e) = &batch.sum_error {
        println!("✗ Mix not written: {}", e);
    }
    println!();
    println!(
        "Summary: {} succeeded, {} failed (of {} jobs)",
        batch.succeeded(),
        batch.failed(),
        batch.outcomes.len()
    );

    Ok(if batch.failed() > 0 || batch.sum_error.is_some() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn run_similar(args: &SimilarArgs, settings: &Settings) -> Result<ExitCode> {
    configure_thread_pool(settings.analysis_threads)?;

    let normalizer: Arc<dyn Normalizer> = if args.ffmpeg {
        Arc::new(FfmpegNormalizer::new())
    } else {
        Arc::new(DecodeNormalizer)
    };
    let extractor = SpectralFeatureExtractor::new(normalizer, args.mfcc)?;
    let ranker = SimilarityRanker::new(&extractor);

    let matches = ranker.find_similar(&args.input, &args.dir, args.threshold)?;
    if matches.is_empty() {
        println!("No files met threshold {:.2}", args.threshold);
    }
    for m in &matches {
        println!("{:.4}  {}", m.score, m.path.display());
    }

    Ok(ExitCode::SUCCESS)
}

fn run_sum(args: &SumArgs) -> Result<ExitCode> {
    mixer::sum(args.inputs.as_slice(), &args.output)?;
    println!("✓ Wrote {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

fn run_match_volume(args: &MatchVolumeArgs) -> Result<ExitCode> {
    let factor = mixer::match_volume(&args.source, &args.target, &args.output)?;
    println!("✓ Wrote {} (gain x{:.4})", args.output.display(), factor);
    Ok(ExitCode::SUCCESS)
}

/// Configure the Rayon thread pool
fn configure_thread_pool(num_threads: usize) -> Result<()> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        Ok(()) => {
            debug!("Configured thread pool with {} threads", num_threads);
        }
        Err(e) => {
            return Err(StemflowError::ConfigError(format!(
                "Failed to configure thread pool: {}",
                e
            )));
        }
    }
    Ok(())
}
