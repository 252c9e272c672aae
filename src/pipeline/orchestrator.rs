//! Job orchestration
//!
//! Drives a [`JobService`] through upload, job creation, polling and download.
//! Batches upload the input once and run one scoped worker thread per job;
//! outcomes come back over a channel in completion order. Post-processing and
//! summing only start once every worker has finished.

use crate::audio::mixer;
use crate::config::Settings;
use crate::error::{Result, StemflowError};
use crate::remote::{Asset, Job, JobMetadata, JobResult, JobService, JobStatus, Model};
use crossbeam_channel::unbounded;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Step applied in place to each downloaded file of a job
pub trait PostProcessor: Send + Sync {
    fn process(&self, path: &Path) -> Result<()>;

    /// Get the name of this processor (for logging)
    fn name(&self) -> &str;
}

/// Post-processors keyed by the model whose outputs they apply to
pub type PostProcessMap = HashMap<Model, Arc<dyn PostProcessor>>;

/// Fixed gain in dB, rewriting the file as 32-bit float WAV
#[derive(Debug, Clone, Copy)]
pub struct GainProcessor {
    pub gain_db: f64,
}

impl GainProcessor {
    pub fn new(gain_db: f64) -> Self {
        Self { gain_db }
    }
}

impl PostProcessor for GainProcessor {
    fn process(&self, path: &Path) -> Result<()> {
        debug!("Applying {:+.1} dB to {}", self.gain_db, path.display());
        mixer::adjust_volume(path, path, mixer::db_to_linear(self.gain_db))
    }

    fn name(&self) -> &str {
        "gain"
    }
}

/// Result of one job within a batch
#[derive(Debug)]
pub struct JobOutcome {
    /// Position of the job's metadata in the submitted list
    pub index: usize,
    pub metadata: JobMetadata,
    pub result: Result<JobResult>,
}

/// Everything a batch produced
#[derive(Debug)]
pub struct BatchOutcome {
    /// Per-job outcomes in completion order
    pub outcomes: Vec<JobOutcome>,
    /// Path of the summed mix, when one was written
    pub summed: Option<PathBuf>,
    /// Why the mix could not be written; job outcomes are unaffected
    pub sum_error: Option<StemflowError>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// All downloaded files of successful jobs, in completion order
    pub fn files(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flat_map(|r| r.files.iter().cloned())
            .collect()
    }

    /// Results in completion order, or the first failure
    pub fn into_results(self) -> Result<Vec<JobResult>> {
        self.outcomes.into_iter().map(|o| o.result).collect()
    }
}

/// Runs jobs against a remote service using the timing and output settings
pub struct JobRunner {
    service: Arc<dyn JobService>,
    settings: Settings,
}

impl JobRunner {
    pub fn new(service: Arc<dyn JobService>, settings: Settings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Upload a local file
    pub fn upload_asset(&self, path: &Path) -> Result<Asset> {
        if !path.is_file() {
            return Err(StemflowError::FileNotFound(path.to_path_buf()));
        }

        info!("Uploading {} via {}", path.display(), self.service.name());
        let asset = self.service.upload_asset(path)?;
        debug!("Created asset {}", asset.id);
        Ok(asset)
    }

    /// Validate metadata, then submit a job
    pub fn create_job(&self, asset_id: &str, metadata: &JobMetadata) -> Result<Job> {
        metadata.validate()?;

        let job = self.service.create_job(
            asset_id,
            metadata,
            self.settings.callback_url.as_deref(),
        )?;
        info!("Created job {} ({} -> {})", job.id, metadata.name, metadata.format);
        Ok(job)
    }

    /// One status fetch
    pub fn poll_job(&self, job_id: &str) -> Result<Job> {
        self.service.get_job(job_id)
    }

    /// Create a job and block until its outputs are downloaded
    pub fn run_job_to_completion(
        &self,
        asset_id: &str,
        metadata: &JobMetadata,
    ) -> Result<JobResult> {
        self.run_job(asset_id, metadata, None)
    }

    /// Upload `path` and run a single job on it
    pub fn process_file(&self, path: &Path, metadata: &JobMetadata) -> Result<JobResult> {
        metadata.validate()?;
        let asset = self.upload_asset(path)?;
        self.run_job_to_completion(&asset.id, metadata)
    }

    /// Upload `path` once and run every job concurrently
    ///
    /// A failed job does not stop its siblings. After all workers finish,
    /// each successful job's files go through the post-processor registered
    /// for its model; then, when `sum_output` is set and every job
    /// succeeded, all files are mixed into `settings.sum_output_path()`.
    /// A mixing failure lands in `BatchOutcome::sum_error` and never
    /// discards the job outcomes.
    pub fn run_jobs_concurrently(
        &self,
        path: &Path,
        jobs: &[JobMetadata],
        post_process: &PostProcessMap,
        sum_output: bool,
    ) -> Result<BatchOutcome> {
        if jobs.is_empty() {
            return Err(StemflowError::InvalidInput(
                "No jobs to run; pass at least one model".to_string(),
            ));
        }
        for metadata in jobs {
            metadata.validate()?;
        }

        let batch_start = Instant::now();
        let asset = self.upload_asset(path)?;
        info!("Running {} jobs on asset {}", jobs.len(), asset.id);

        let mut outcomes = self.run_workers(&asset.id, jobs);

        for outcome in outcomes.iter_mut() {
            apply_post_processing(outcome, post_process);
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            "Batch finished in {:.1}s: {} succeeded, {} failed",
            batch_start.elapsed().as_secs_f64(),
            outcomes.len() - failed,
            failed
        );

        let mut batch = BatchOutcome {
            outcomes,
            summed: None,
            sum_error: None,
        };

        if sum_output {
            match self.sum_outputs(&batch, failed) {
                Ok(summed) => batch.summed = summed,
                Err(e) => {
                    error!("Failed to sum {} files: {}", batch.files().len(), e);
                    batch.sum_error = Some(e);
                }
            }
        }

        Ok(batch)
    }

    /// Spawn one scoped worker per job and gather outcomes as they complete
    fn run_workers(&self, asset_id: &str, jobs: &[JobMetadata]) -> Vec<JobOutcome> {
        let multi_progress = MultiProgress::new();
        let (tx, rx) = unbounded::<JobOutcome>();

        thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .enumerate()
                .map(|(index, metadata)| {
                    let tx = tx.clone();
                    let progress = self
                        .settings
                        .show_progress
                        .then(|| job_spinner(&multi_progress, metadata));

                    scope.spawn(move || {
                        let result = self.run_job(asset_id, metadata, progress.as_ref());
                        if let Some(pb) = progress {
                            match &result {
                                Ok(r) => pb.finish_with_message(format!("done ({} files)", r.files.len())),
                                Err(e) => pb.abandon_with_message(format!("failed: {}", e)),
                            }
                        }
                        // Receiver outlives every worker
                        let _ = tx.send(JobOutcome {
                            index,
                            metadata: metadata.clone(),
                            result,
                        });
                    })
                })
                .collect();

            // Only worker clones remain, so the channel closes when the last worker exits
            drop(tx);

            let mut outcomes = Vec::with_capacity(jobs.len());
            for outcome in rx.iter() {
                match &outcome.result {
                    Ok(r) => info!(
                        "Job {} ({}) completed in {:.1}s",
                        r.job.id,
                        outcome.metadata.name,
                        r.elapsed.as_secs_f64()
                    ),
                    Err(e) => error!("Job for {} failed: {}", outcome.metadata.name, e),
                }
                outcomes.push(outcome);
            }

            for (index, handle) in handles.into_iter().enumerate() {
                if let Err(panic_info) = handle.join() {
                    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!("Worker {} panicked: {}", index, message);
                    outcomes.push(JobOutcome {
                        index,
                        metadata: jobs[index].clone(),
                        result: Err(StemflowError::WorkerPanicked { index, message }),
                    });
                }
            }

            outcomes
        })
    }

    fn run_job(
        &self,
        asset_id: &str,
        metadata: &JobMetadata,
        progress: Option<&ProgressBar>,
    ) -> Result<JobResult> {
        let created = self.create_job(asset_id, metadata)?;
        let job_id = created.id;
        let start = Instant::now();

        loop {
            let job = self.poll_job(&job_id)?;
            debug!("Job {} is {}", job_id, job.status);
            if let Some(pb) = progress {
                pb.set_message(job.status.to_string());
            }

            match job.status {
                JobStatus::Completed => {
                    if let Some(pb) = progress {
                        pb.set_message("downloading");
                    }
                    let files = self.download_outputs(&job)?;
                    return Ok(JobResult {
                        metadata: metadata.clone(),
                        job,
                        files,
                        elapsed: start.elapsed(),
                        completed_at: chrono::Utc::now(),
                    });
                }
                JobStatus::Failed | JobStatus::Error => {
                    return Err(StemflowError::JobFailed {
                        job_id,
                        status: job.status.to_string(),
                    });
                }
                _ => {}
            }

            if start.elapsed() > self.settings.timeout {
                return Err(StemflowError::JobTimeout {
                    job_id,
                    timeout: self.settings.timeout,
                });
            }

            thread::sleep(self.settings.poll_interval);
        }
    }

    fn download_outputs(&self, job: &Job) -> Result<Vec<PathBuf>> {
        let output_dir = &self.settings.output_dir;
        fs::create_dir_all(output_dir).map_err(|e| StemflowError::output_error(output_dir, e))?;

        let mut files = Vec::with_capacity(job.output_assets.len());
        for asset in &job.output_assets {
            let Some(link) = asset.link.as_deref() else {
                warn!(
                    "Job {}: output {:?} has no download link, skipping",
                    job.id, asset.name
                );
                continue;
            };

            let destination = asset.destination(output_dir, &job.id);
            let bytes = self.service.download_asset(link, &destination)?;
            info!("Downloaded {} ({} bytes)", destination.display(), bytes);
            files.push(destination);
        }

        Ok(files)
    }

    fn sum_outputs(&self, batch: &BatchOutcome, failed: usize) -> Result<Option<PathBuf>> {
        if failed > 0 {
            warn!("Skipping sum: {} of {} jobs failed", failed, batch.outcomes.len());
            return Ok(None);
        }

        let files = batch.files();
        if files.len() < 2 {
            warn!("Skipping sum: need at least 2 files, got {}", files.len());
            return Ok(None);
        }

        let output = self.settings.sum_output_path();
        mixer::sum(files.as_slice(), &output)?;
        Ok(Some(output))
    }
}

fn job_spinner(multi_progress: &MultiProgress, metadata: &JobMetadata) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:>14.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(metadata.name.to_string());
    pb.set_message("submitting");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Run the model's post-processor over a successful outcome's files
///
/// A processor error turns the outcome into a failure.
fn apply_post_processing(outcome: &mut JobOutcome, post_process: &PostProcessMap) {
    let Some(processor) = post_process.get(&outcome.metadata.name) else {
        return;
    };
    let failure = match &outcome.result {
        Ok(result) => result.files.iter().find_map(|file| {
            debug!("Post-processing {} with {}", file.display(), processor.name());
            processor.process(file).err().map(|e| {
                error!(
                    "Post-processing {} with {} failed: {}",
                    file.display(),
                    processor.name(),
                    e
                );
                e
            })
        }),
        Err(_) => None,
    };

    if let Some(e) = failure {
        outcome.result = Err(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::OutputFormat;
    use chrono::Utc;

    fn result_with_files(metadata: &JobMetadata, files: Vec<PathBuf>) -> JobResult {
        JobResult {
            metadata: metadata.clone(),
            job: Job {
                id: "j".into(),
                status: JobStatus::Completed,
                output_assets: Vec::new(),
                metadata: None,
            },
            files,
            elapsed: Duration::ZERO,
            completed_at: Utc::now(),
        }
    }

    struct Failing;

    impl PostProcessor for Failing {
        fn process(&self, path: &Path) -> Result<()> {
            Err(StemflowError::InvalidInput(format!("refused {}", path.display())))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_into_results_surfaces_first_failure() {
        let meta = JobMetadata::new(Model::Bass, OutputFormat::Wav);
        let batch = BatchOutcome {
            outcomes: vec![
                JobOutcome {
                    index: 1,
                    metadata: meta.clone(),
                    result: Ok(result_with_files(&meta, vec![])),
                },
                JobOutcome {
                    index: 0,
                    metadata: meta.clone(),
                    result: Err(StemflowError::JobFailed {
                        job_id: "x".into(),
                        status: "failed".into(),
                    }),
                },
            ],
            summed: None,
            sum_error: None,
        };
        assert_eq!(batch.succeeded(), 1);
        assert_eq!(batch.failed(), 1);
        assert!(matches!(
            batch.into_results(),
            Err(StemflowError::JobFailed { .. })
        ));
    }

    #[test]
    fn test_post_processing_error_fails_outcome() {
        let meta = JobMetadata::new(Model::Drums, OutputFormat::Wav);
        let mut outcome = JobOutcome {
            index: 0,
            metadata: meta.clone(),
            result: Ok(result_with_files(&meta, vec![PathBuf::from("drums.wav")])),
        };
        let mut map = PostProcessMap::new();
        map.insert(Model::Drums, Arc::new(Failing) as Arc<dyn PostProcessor>);

        apply_post_processing(&mut outcome, &map);
        assert!(matches!(outcome.result, Err(StemflowError::InvalidInput(_))));
    }

    #[test]
    fn test_post_processing_only_for_registered_model() {
        let meta = JobMetadata::new(Model::Vocals, OutputFormat::Wav);
        let mut outcome = JobOutcome {
            index: 0,
            metadata: meta.clone(),
            result: Ok(result_with_files(&meta, vec![PathBuf::from("vocals.wav")])),
        };
        let mut map = PostProcessMap::new();
        map.insert(Model::Drums, Arc::new(Failing) as Arc<dyn PostProcessor>);

        apply_post_processing(&mut outcome, &map);
        assert!(outcome.result.is_ok());
    }
}
