use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::claim::ClaimKind;

/// Identifies the verification engine that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Github,
    Linkedin,
    Certificate,
    SkillTest,
    Timeline,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Github => "github",
            EngineKind::Linkedin => "linkedin",
            EngineKind::Certificate => "certificate",
            EngineKind::SkillTest => "skill_test",
            EngineKind::Timeline => "timeline",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one engine checking one claim.
///
/// Failed engines still produce a result: score 0.0 plus `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub source: EngineKind,
    pub claim_id: Uuid,
    pub score: f64,
    pub evidence: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn succeeded(source: EngineKind, claim_id: Uuid, score: f64, evidence: Value) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            source,
            claim_id,
            score,
            evidence,
            error: None,
        }
    }

    pub fn failed(source: EngineKind, claim_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            source,
            claim_id,
            score: 0.0,
            evidence: json!({}),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Reads a numeric evidence field, if present.
    pub fn evidence_f64(&self, key: &str) -> Option<f64> {
        self.evidence.get(key).and_then(Value::as_f64)
    }
}

/// All engine results for one claim plus their mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerification {
    pub claim_id: Uuid,
    pub claim_kind: ClaimKind,
    pub results: Vec<VerificationResult>,
    /// Arithmetic mean over every result, errored ones counting as 0.0.
    pub average_score: f64,
    pub verified_at: DateTime<Utc>,
}

impl ClaimVerification {
    #[cfg(test)]
    pub fn result_for(&self, source: EngineKind) -> Option<&VerificationResult> {
        self.results.iter().find(|r| r.source == source)
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }
}

/// Mean of all result scores. Errors are NOT filtered out.
pub fn mean_score(results: &[VerificationResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let sum: f64 = results.iter().map(|r| r.score).sum();
    (sum / results.len() as f64).clamp(0.0, 1.0)
}
