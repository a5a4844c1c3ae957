//! Background processing of uploaded resumes and retention of old ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::resume::{ProcessingStage, ResumeRecord};
use crate::pipeline::{DocumentSource, PipelineError, ResumePipeline, StageObserver};
use crate::resumes::repository::{RepositoryError, ResumeRepository};
use crate::verification::orchestrator::cancelled;
use crate::verification::VerificationContext;

/// Cancel switches for resumes currently being processed.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<HashMap<Uuid, watch::Sender<bool>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `id` as in flight and returns its cancel signal.
    pub fn register(&self, id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.lock().insert(id, tx);
        rx
    }

    /// Signals cancellation. Returns false when nothing was running.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    #[cfg(test)]
    pub fn is_running(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, watch::Sender<bool>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a processing task needs, cloned out of the app state.
#[derive(Clone)]
pub struct Processor {
    pub repository: Arc<dyn ResumeRepository>,
    pub pipeline: Arc<ResumePipeline>,
    pub jobs: JobRegistry,
}

impl Processor {
    /// Registers the job, then processes it on a background task.
    pub fn spawn(
        &self,
        record: ResumeRecord,
        source: DocumentSource,
        ctx: VerificationContext,
    ) -> JoinHandle<()> {
        let cancel = self.jobs.register(record.id);
        let this = self.clone();
        tokio::spawn(async move {
            let id = record.id;
            this.process(record, source, ctx, cancel).await;
            this.jobs.finish(id);
        })
    }

    /// Drives one record through the pipeline, persisting each transition.
    pub async fn process(
        &self,
        mut record: ResumeRecord,
        source: DocumentSource,
        ctx: VerificationContext,
        cancel: watch::Receiver<bool>,
    ) {
        let mut stages = RecordStages {
            repository: self.repository.as_ref(),
            record: &mut record,
        };
        let outcome = self.pipeline.run(source, &ctx, cancel, &mut stages).await;

        match outcome {
            Ok(report) => {
                record.complete(report);
                if let Err(PipelineError::Abandoned(reason)) =
                    store(self.repository.as_ref(), &record).await
                {
                    debug!(resume_id = %record.id, %reason, "Finished record not stored");
                    return;
                }
                info!(
                    resume_id = %record.id,
                    trust_score = record.trust_score.as_ref().map(|t| t.overall),
                    "Resume processing completed"
                );
            }
            Err(PipelineError::Cancelled) => {
                info!(resume_id = %record.id, "Processing cancelled");
                record.advance(ProcessingStage::Cancelled);
                self.persist(&record).await;
            }
            Err(PipelineError::Abandoned(reason)) => {
                debug!(resume_id = %record.id, %reason, "Record deleted during processing");
            }
            Err(e) => {
                warn!(resume_id = %record.id, error = %e, "Processing failed");
                record.fail(e.to_string());
                self.persist(&record).await;
            }
        }
    }

    async fn persist(&self, record: &ResumeRecord) {
        if let Err(e) = self.repository.update(record).await {
            debug!(resume_id = %record.id, error = %e, "Final state not persisted");
        }
    }
}

/// Mirrors pipeline stages onto the stored record.
struct RecordStages<'a> {
    repository: &'a dyn ResumeRepository,
    record: &'a mut ResumeRecord,
}

#[async_trait]
impl StageObserver for RecordStages<'_> {
    async fn entering(&mut self, stage: ProcessingStage) -> Result<(), PipelineError> {
        self.record.advance(stage);
        info!(resume_id = %self.record.id, stage = %stage, "Stage transition");
        store(self.repository, self.record).await
    }
}

/// Writes `record`. Only a vanished record stops processing; other
/// failures are logged and the final state is written again later.
async fn store(
    repository: &dyn ResumeRepository,
    record: &ResumeRecord,
) -> Result<(), PipelineError> {
    match repository.update(record).await {
        Ok(()) => Ok(()),
        Err(RepositoryError::NotFound(id)) => {
            Err(PipelineError::Abandoned(format!("resume {id} no longer exists")))
        }
        Err(e) => {
            error!(resume_id = %record.id, error = %e, "Failed to persist stage");
            Ok(())
        }
    }
}

/// Deletes records older than the retention window on a fixed cadence,
/// cancelling any that are still processing.
pub struct RetentionSweeper {
    pub repository: Arc<dyn ResumeRepository>,
    pub jobs: JobRegistry,
    pub retention: chrono::Duration,
    pub every: Duration,
}

impl RetentionSweeper {
    pub async fn sweep(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        match self.repository.purge_older_than(cutoff).await {
            Ok(ids) => {
                for id in &ids {
                    self.jobs.cancel(*id);
                }
                if !ids.is_empty() {
                    info!(purged = ids.len(), "Retention sweep removed expired resumes");
                }
                ids.len()
            }
            Err(e) => {
                warn!(error = %e, "Retention sweep failed (non-fatal)");
                0
            }
        }
    }

    /// Sweeps until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        info!(
            retention_hours = self.retention.num_hours(),
            every_secs = self.every.as_secs(),
            "Retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = cancelled(&mut shutdown) => {
                    info!("Retention sweeper stopped");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
