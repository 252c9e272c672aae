//! Remote job orchestration

pub mod orchestrator;

pub use orchestrator::{
    BatchOutcome, GainProcessor, JobOutcome, JobRunner, PostProcessMap, PostProcessor,
};
