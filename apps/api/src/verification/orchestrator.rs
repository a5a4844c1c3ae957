//! Fans each claim out to the engines its kind calls for.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::models::claim::{Claim, ClaimKind};
use crate::models::verification::{mean_score, ClaimVerification, EngineKind, VerificationResult};
use crate::verification::certificate::{CertificateEngine, CertificateInspector};
use crate::verification::github::{GitHubApi, GitHubEngine};
use crate::verification::linkedin::LinkedInEngine;
use crate::verification::skill_test::SkillTestEngine;
use crate::verification::timeline::TimelineEngine;
use crate::verification::{EngineError, VerificationContext, VerificationEngine};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLAIM_PARALLELISM: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Verification cancelled")]
pub struct Cancelled;

/// Engines that apply to a claim kind, in run order. Timeline always runs.
pub fn dispatch_plan(kind: ClaimKind) -> Vec<EngineKind> {
    let mut plan = match kind {
        ClaimKind::Skill => vec![EngineKind::Github, EngineKind::SkillTest],
        ClaimKind::Education | ClaimKind::Experience => vec![EngineKind::Linkedin],
        ClaimKind::Certification => vec![EngineKind::Certificate],
    };
    plan.push(EngineKind::Timeline);
    plan
}

pub struct VerificationOrchestrator {
    engines: BTreeMap<EngineKind, Arc<dyn VerificationEngine>>,
    /// Shared across every claim and document this orchestrator serves.
    limiter: Arc<Semaphore>,
    engine_timeout: Duration,
    claim_parallelism: usize,
}

impl VerificationOrchestrator {
    /// An orchestrator with no engines registered.
    pub fn new(max_concurrency: usize, engine_timeout: Duration) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            engines: BTreeMap::new(),
            limiter: Arc::new(Semaphore::new(max_concurrency)),
            engine_timeout,
            claim_parallelism: DEFAULT_CLAIM_PARALLELISM.min(max_concurrency),
        }
    }

    /// All five engines, with the given GitHub and certificate backends.
    pub fn standard(
        github: Arc<dyn GitHubApi>,
        inspector: Arc<dyn CertificateInspector>,
        max_concurrency: usize,
        engine_timeout: Duration,
    ) -> Self {
        Self::new(max_concurrency, engine_timeout)
            .with_engine(Arc::new(GitHubEngine::new(github)))
            .with_engine(Arc::new(LinkedInEngine))
            .with_engine(Arc::new(CertificateEngine::new(inspector)))
            .with_engine(Arc::new(SkillTestEngine))
            .with_engine(Arc::new(TimelineEngine))
    }

    /// Registers `engine` under its kind, replacing any earlier one.
    pub fn with_engine(mut self, engine: Arc<dyn VerificationEngine>) -> Self {
        self.engines.insert(engine.kind(), engine);
        self
    }

    pub fn with_claim_parallelism(mut self, parallelism: usize) -> Self {
        self.claim_parallelism = parallelism.max(1);
        self
    }

    /// Runs one engine under the shared limit and the per-call timeout.
    /// Never fails: every error becomes a score-0 result.
    pub async fn run_engine(
        &self,
        kind: EngineKind,
        claim: &Claim,
        ctx: &VerificationContext,
    ) -> VerificationResult {
        let Some(engine) = self.engines.get(&kind) else {
            warn!(engine = %kind, "Engine not registered; recording failure");
            return VerificationResult::failed(
                kind,
                claim.id,
                EngineError::Unregistered(kind).to_string(),
            );
        };

        let Ok(_permit) = self.limiter.acquire().await else {
            return VerificationResult::failed(kind, claim.id, "Verification limiter closed");
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.engine_timeout, engine.check(claim, ctx))
            .await
            .unwrap_or_else(|_| Err(EngineError::Timeout(self.engine_timeout)));
        debug!(
            engine = %kind,
            claim_id = %claim.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Engine finished"
        );

        match outcome {
            Ok(outcome) => {
                VerificationResult::succeeded(kind, claim.id, outcome.score, outcome.evidence)
            }
            Err(e) => {
                warn!(engine = %kind, claim_id = %claim.id, error = %e, "Verification engine failed");
                VerificationResult::failed(kind, claim.id, e.to_string())
            }
        }
    }

    /// Runs every applicable engine for `claim` concurrently.
    pub async fn verify_claim(&self, claim: &Claim, ctx: &VerificationContext) -> ClaimVerification {
        let plan = dispatch_plan(claim.kind);
        let results: Vec<VerificationResult> =
            join_all(plan.iter().map(|&kind| self.run_engine(kind, claim, ctx))).await;

        let average_score = mean_score(&results);
        debug!(
            claim_id = %claim.id,
            kind = %claim.kind,
            engines = results.len(),
            average_score,
            "Claim verified"
        );

        ClaimVerification {
            claim_id: claim.id,
            claim_kind: claim.kind,
            results,
            average_score,
            verified_at: Utc::now(),
        }
    }

    /// Verifies every claim with bounded parallelism, returning results in
    /// claim order. Stops as soon as `cancel` flips to `true`.
    pub async fn verify_all(
        &self,
        claims: &[Claim],
        ctx: &VerificationContext,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Vec<ClaimVerification>, Cancelled> {
        if *cancel.borrow() {
            return Err(Cancelled);
        }

        // Built up front so the stream holds plain futures, keeping the
        // whole call `Send` for `tokio::spawn`.
        let pending: Vec<_> = claims
            .iter()
            .enumerate()
            .map(|(idx, claim)| async move { (idx, self.verify_claim(claim, ctx).await) })
            .collect();
        let work = futures::stream::iter(pending)
            .buffer_unordered(self.claim_parallelism)
            .collect::<Vec<_>>();

        tokio::select! {
            done = work => {
                let mut done = done;
                done.sort_by_key(|(idx, _)| *idx);
                info!("Verified {} claims", done.len());
                Ok(done.into_iter().map(|(_, v)| v).collect())
            }
            _ = cancelled(&mut cancel) => {
                warn!("Verification cancelled with {} claims pending", claims.len());
                Err(Cancelled)
            }
        }
    }
}

/// Resolves once the flag reads `true`. A dropped sender never cancels.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
