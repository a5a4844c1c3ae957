use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::ResumePipeline;
use crate::resumes::jobs::{JobRegistry, Processor};
use crate::resumes::repository::ResumeRepository;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Postgres when `DATABASE_URL` is set, in-memory otherwise.
    pub repository: Arc<dyn ResumeRepository>,
    pub pipeline: Arc<ResumePipeline>,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn processor(&self) -> Processor {
        Processor {
            repository: self.repository.clone(),
            pipeline: self.pipeline.clone(),
            jobs: self.jobs.clone(),
        }
    }
}
