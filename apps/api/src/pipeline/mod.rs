//! End-to-end run over one document: extract → verify → score.
//!
//! Extraction errors escalate to the caller. Engine errors never do: they
//! surface as score-0 results and lower the document's coverage.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::extraction::document::{clean_text, ensure_text, parse_document, ExtractionError};
use crate::extraction::{ClaimExtractor, Extraction, ExtractionMode};
use crate::models::claim::Claim;
use crate::models::prediction::{Prediction, TrustScore};
use crate::models::resume::ProcessingStage;
use crate::models::verification::ClaimVerification;
use crate::scoring::classifier::TruthClassifier;
use crate::scoring::explain::{explain, Explanation};
use crate::scoring::features::{FeatureEngineer, FeatureVector, ResumeContext};
use crate::scoring::trust::TrustScoreAggregator;
use crate::verification::orchestrator::{cancelled, Cancelled, VerificationOrchestrator};
use crate::verification::VerificationContext;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Processing cancelled")]
    Cancelled,

    /// The observer stopped the run, e.g. because its record was erased.
    #[error("Processing abandoned: {0}")]
    Abandoned(String),
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        PipelineError::Cancelled
    }
}

/// Where a resume's text comes from.
pub enum DocumentSource {
    Upload { filename: String, bytes: Vec<u8> },
    Text(String),
}

impl DocumentSource {
    /// Decodes the document to raw text. Parsing runs on the blocking pool.
    pub async fn load(self) -> Result<String, ExtractionError> {
        match self {
            DocumentSource::Text(text) => ensure_text(text),
            DocumentSource::Upload { filename, bytes } => {
                tokio::task::spawn_blocking(move || parse_document(&filename, &bytes))
                    .await
                    .map_err(|e| ExtractionError::Io(std::io::Error::other(e)))?
            }
        }
    }
}

/// Told about each stage before it starts. An error aborts the run.
#[async_trait]
pub trait StageObserver: Send {
    async fn entering(&mut self, stage: ProcessingStage) -> Result<(), PipelineError>;
}

/// Everything one run produced, persisted alongside the resume record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub extraction_mode: ExtractionMode,
    pub claims: Vec<Claim>,
    pub verifications: Vec<ClaimVerification>,
    pub features: Vec<FeatureVector>,
    pub predictions: Vec<Prediction>,
    pub explanations: Vec<Explanation>,
    pub trust_score: TrustScore,
}

impl PipelineReport {
    /// Results whose engine failed, across all claims.
    pub fn engine_error_count(&self) -> usize {
        self.verifications.iter().map(|v| v.error_count()).sum()
    }
}

struct Scored {
    features: Vec<FeatureVector>,
    predictions: Vec<Prediction>,
    explanations: Vec<Explanation>,
    trust_score: TrustScore,
}

pub struct ResumePipeline {
    extractor: ClaimExtractor,
    orchestrator: Arc<VerificationOrchestrator>,
    features: FeatureEngineer,
    classifier: Arc<dyn TruthClassifier>,
    aggregator: TrustScoreAggregator,
}

impl ResumePipeline {
    pub fn new(
        extractor: ClaimExtractor,
        orchestrator: Arc<VerificationOrchestrator>,
        classifier: Arc<dyn TruthClassifier>,
    ) -> Self {
        Self {
            extractor,
            orchestrator,
            features: FeatureEngineer,
            classifier,
            aggregator: TrustScoreAggregator,
        }
    }

    pub fn orchestrator(&self) -> &VerificationOrchestrator {
        &self.orchestrator
    }

    /// Runs extraction, verification and scoring in order, reporting each
    /// stage to `observer`. Extraction and verification stop as soon as
    /// `cancel` flips.
    pub async fn run(
        &self,
        source: DocumentSource,
        ctx: &VerificationContext,
        mut cancel: watch::Receiver<bool>,
        observer: &mut dyn StageObserver,
    ) -> Result<PipelineReport, PipelineError> {
        observer.entering(ProcessingStage::Extracting).await?;
        let (raw_text, extraction) = until_cancelled(&mut cancel, async {
            let raw_text = source.load().await?;
            let extraction = self.extract(&raw_text).await?;
            Ok::<_, PipelineError>((raw_text, extraction))
        })
        .await??;

        observer.entering(ProcessingStage::Verifying).await?;
        let verifications = self
            .verify(&extraction.claims, &raw_text, ctx, cancel.clone())
            .await?;
        if *cancel.borrow() {
            return Err(PipelineError::Cancelled);
        }

        observer.entering(ProcessingStage::Scoring).await?;
        let scored = self.score(&extraction, &verifications, &raw_text);
        Ok(assemble(extraction, verifications, scored))
    }

    async fn extract(&self, raw_text: &str) -> Result<Extraction, PipelineError> {
        let cleaned = ensure_text(clean_text(raw_text))?;
        Ok(self.extractor.extract(&cleaned).await)
    }

    /// `ctx` receives the raw document text for the timeline engine.
    async fn verify(
        &self,
        claims: &[Claim],
        raw_text: &str,
        ctx: &VerificationContext,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<ClaimVerification>, PipelineError> {
        let mut ctx = ctx.clone();
        ctx.document_text = Some(raw_text.to_string());
        Ok(self.orchestrator.verify_all(claims, &ctx, cancel).await?)
    }

    fn score(
        &self,
        extraction: &Extraction,
        verifications: &[ClaimVerification],
        raw_text: &str,
    ) -> Scored {
        let tagged = (extraction.mode == ExtractionMode::Full).then_some(&extraction.entities);
        let resume = ResumeContext::new(raw_text, &extraction.claims, tagged);

        let features: Vec<FeatureVector> = extraction
            .claims
            .iter()
            .zip(verifications)
            .map(|(claim, v)| {
                let vector = self.features.build(claim, &v.results, &resume);
                debug!(claim_id = %claim.id, features = ?vector.named(), "Feature vector built");
                vector
            })
            .collect();
        let predictions: Vec<Prediction> = features
            .iter()
            .map(|f| {
                let prediction = self.classifier.classify(f);
                debug!(
                    claim_id = %prediction.claim_id,
                    label = %prediction.label,
                    confidence = prediction.confidence,
                    classifier = self.classifier.name(),
                    "Claim classified"
                );
                prediction
            })
            .collect();
        let explanations = extraction
            .claims
            .iter()
            .zip(&features)
            .zip(&predictions)
            .map(|((claim, f), p)| explain(claim, f, p))
            .collect();
        let trust_score = self.aggregator.aggregate(&predictions);

        Scored {
            features,
            predictions,
            explanations,
            trust_score,
        }
    }
}

/// Races `work` against the cancel flag, which wins ties.
async fn until_cancelled<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    work: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(PipelineError::Cancelled),
        out = work => Ok(out),
    }
}

fn assemble(
    extraction: Extraction,
    verifications: Vec<ClaimVerification>,
    scored: Scored,
) -> PipelineReport {
    let report = PipelineReport {
        extraction_mode: extraction.mode,
        claims: extraction.claims,
        verifications,
        features: scored.features,
        predictions: scored.predictions,
        explanations: scored.explanations,
        trust_score: scored.trust_score,
    };
    info!(
        claims = report.claims.len(),
        engine_errors = report.engine_error_count(),
        trust = report.trust_score.overall,
        "Pipeline run complete"
    );
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extraction::tagger::{EntityMap, EntityTagger, TaggerError};
    use crate::models::verification::EngineKind;
    use crate::scoring::classifier::EvidenceClassifier;
    use crate::verification::certificate::SignatureInspector;
    use crate::verification::github::{GitHubApi, GitHubProfile, GitHubRepo};
    use crate::verification::orchestrator::DEFAULT_ENGINE_TIMEOUT;
    use crate::verification::EngineError;
    use std::time::Duration;

    pub(crate) struct OfflineGitHub;

    #[async_trait]
    impl GitHubApi for OfflineGitHub {
        async fn profile(&self, username: &str) -> Result<GitHubProfile, EngineError> {
            Err(EngineError::NotFound(format!("GitHub user {username} not found")))
        }

        async fn repos(&self, _username: &str) -> Result<Vec<GitHubRepo>, EngineError> {
            Ok(Vec::new())
        }
    }

    fn offline_orchestrator() -> Arc<VerificationOrchestrator> {
        Arc::new(VerificationOrchestrator::standard(
            Arc::new(OfflineGitHub),
            Arc::new(SignatureInspector),
            4,
            DEFAULT_ENGINE_TIMEOUT,
        ))
    }

    pub(crate) fn offline_pipeline() -> ResumePipeline {
        ResumePipeline::new(
            ClaimExtractor::pattern_only(),
            offline_orchestrator(),
            Arc::new(EvidenceClassifier::default()),
        )
    }

    /// Collects stage boundaries; optionally refuses one of them.
    #[derive(Default)]
    pub(crate) struct StageLog {
        pub(crate) seen: Vec<ProcessingStage>,
        refuse: Option<ProcessingStage>,
    }

    #[async_trait]
    impl StageObserver for StageLog {
        async fn entering(&mut self, stage: ProcessingStage) -> Result<(), PipelineError> {
            self.seen.push(stage);
            if self.refuse == Some(stage) {
                return Err(PipelineError::Abandoned("record erased".into()));
            }
            Ok(())
        }
    }

    /// Never answers, like a hung model endpoint.
    struct StalledTagger;

    #[async_trait]
    impl EntityTagger for StalledTagger {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn tag(&self, _text: &str) -> Result<EntityMap, TaggerError> {
            std::future::pending().await
        }
    }

    pub(crate) const RESUME: &str = "\
Jane Doe - jane@example.com - https://github.com/jane
Experience
Senior Software Engineer at Acme Corp, Jan 2018 - Jan 2019
Data Engineer at Beta Labs, Jun 2018 - Jan 2020
Education
B.S. in Computer Science from Stanford University
Skills
Python, Rust, Docker
Certifications
AWS Certified Solutions Architect";

    async fn run_text(
        pipeline: &ResumePipeline,
        text: &str,
        ctx: &VerificationContext,
    ) -> Result<PipelineReport, PipelineError> {
        let (_tx, rx) = watch::channel(false);
        pipeline
            .run(
                DocumentSource::Text(text.to_string()),
                ctx,
                rx,
                &mut StageLog::default(),
            )
            .await
    }

    #[tokio::test]
    async fn test_run_produces_consistent_report() {
        let report = run_text(&offline_pipeline(), RESUME, &VerificationContext::default())
            .await
            .unwrap();

        assert_eq!(report.extraction_mode, ExtractionMode::PatternOnly);
        assert!(!report.claims.is_empty());
        assert_eq!(report.verifications.len(), report.claims.len());
        assert_eq!(report.features.len(), report.claims.len());
        assert_eq!(report.predictions.len(), report.claims.len());
        assert_eq!(report.trust_score.total_claims(), report.claims.len());
        assert!((0.0..=100.0).contains(&report.trust_score.overall));

        for (claim, v) in report.claims.iter().zip(&report.verifications) {
            assert_eq!(claim.id, v.claim_id);
            assert!(v.results.iter().all(|r| r.claim_id == claim.id));
            assert!(v.results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
        }
    }

    #[tokio::test]
    async fn test_stages_are_reported_in_order() {
        let (_tx, rx) = watch::channel(false);
        let mut log = StageLog::default();
        offline_pipeline()
            .run(
                DocumentSource::Text(RESUME.to_string()),
                &VerificationContext::default(),
                rx,
                &mut log,
            )
            .await
            .unwrap();
        assert_eq!(
            log.seen,
            vec![
                ProcessingStage::Extracting,
                ProcessingStage::Verifying,
                ProcessingStage::Scoring
            ]
        );
    }

    #[tokio::test]
    async fn test_observer_can_abandon_the_run() {
        let (_tx, rx) = watch::channel(false);
        let mut log = StageLog {
            refuse: Some(ProcessingStage::Verifying),
            ..Default::default()
        };
        let err = offline_pipeline()
            .run(
                DocumentSource::Text(RESUME.to_string()),
                &VerificationContext::default(),
                rx,
                &mut log,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Abandoned(_)));
        assert_eq!(log.seen.last(), Some(&ProcessingStage::Verifying));
    }

    #[tokio::test]
    async fn test_overlapping_jobs_reach_every_claim() {
        let report = run_text(&offline_pipeline(), RESUME, &VerificationContext::default())
            .await
            .unwrap();
        for v in &report.verifications {
            let timeline = v.result_for(EngineKind::Timeline).unwrap();
            assert!(timeline.score < 1.0);
        }
    }

    #[tokio::test]
    async fn test_engine_errors_do_not_fail_the_run() {
        let ctx = VerificationContext {
            github_username: Some("ghost".into()),
            ..Default::default()
        };
        let report = run_text(&offline_pipeline(), RESUME, &ctx).await.unwrap();
        assert!(report.engine_error_count() > 0);
    }

    #[tokio::test]
    async fn test_blank_document_escalates() {
        let err = run_text(&offline_pipeline(), "  \n ", &VerificationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction(ExtractionError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_extraction() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut log = StageLog::default();
        let err = offline_pipeline()
            .run(
                DocumentSource::Text(RESUME.to_string()),
                &VerificationContext::default(),
                rx,
                &mut log,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(log.seen, vec![ProcessingStage::Extracting]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_entity_tagging() {
        let pipeline = ResumePipeline::new(
            ClaimExtractor::new(Arc::new(StalledTagger)),
            offline_orchestrator(),
            Arc::new(EvidenceClassifier::default()),
        );
        let (tx, rx) = watch::channel(false);
        let mut log = StageLog::default();
        let ctx = VerificationContext::default();

        let (result, _) = tokio::join!(
            pipeline.run(
                DocumentSource::Text(RESUME.to_string()),
                &ctx,
                rx,
                &mut log,
            ),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                tx.send(true).unwrap();
            }
        );
        assert!(matches!(result.unwrap_err(), PipelineError::Cancelled));
        assert_eq!(log.seen, vec![ProcessingStage::Extracting]);
    }
}
