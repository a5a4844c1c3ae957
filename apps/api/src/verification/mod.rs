//! Verification engines and the orchestrator that fans claims out to them.
//!
//! Each engine checks one claim against whatever hints the caller supplied
//! in [`VerificationContext`]. Engines report problems as [`EngineError`];
//! the orchestrator turns those into score-0 results, so no engine failure
//! ever reaches the pipeline.

pub mod certificate;
pub mod github;
pub mod handlers;
pub mod linkedin;
pub mod orchestrator;
pub mod timeline;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::claim::Claim;
use crate::models::verification::EngineKind;

/// Engine-specific hints supplied alongside a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationContext {
    #[serde(default)]
    pub github_username: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    /// Uploaded alongside the document; never read from request JSON.
    #[serde(skip)]
    pub certificate: Option<CertificateImage>,
    /// Skill name → submitted multiple-choice answers, in question order.
    #[serde(default)]
    pub skill_answers: HashMap<String, Vec<String>>,
    /// Raw (uncleaned) document text, set by the pipeline.
    #[serde(skip)]
    pub document_text: Option<String>,
}

impl VerificationContext {
    /// Answers submitted for `skill`, matched case-insensitively.
    pub fn answers_for(&self, skill: &str) -> Option<&[String]> {
        self.skill_answers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(skill))
            .map(|(_, answers)| answers.as_slice())
    }
}

/// Certificate bytes received as an upload.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateImage(Arc<[u8]>);

impl CertificateImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CertificateImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateImage({} bytes)", self.0.len())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    MissingInput(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Engine timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Certificate inspection failed: {0}")]
    Certificate(String),

    #[error("Engine '{0}' is not registered")]
    Unregistered(EngineKind),
}

/// Successful engine output. Scores are clamped to [0, 1] by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    pub score: f64,
    pub evidence: Value,
}

impl EngineOutcome {
    pub fn new(score: f64, evidence: Value) -> Self {
        Self { score, evidence }
    }
}

/// A single verification source.
#[async_trait]
pub trait VerificationEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn check(
        &self,
        claim: &Claim,
        ctx: &VerificationContext,
    ) -> Result<EngineOutcome, EngineError>;
}
