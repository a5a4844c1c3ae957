use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruthLabel {
    Verified,
    Doubtful,
    Fake,
}

impl TruthLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruthLabel::Verified => "verified",
            TruthLabel::Doubtful => "doubtful",
            TruthLabel::Fake => "fake",
        }
    }
}

impl fmt::Display for TruthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict for a single claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub claim_id: Uuid,
    pub label: TruthLabel,
    pub confidence: f64,
}

/// Document-level summary of all claim predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    /// In `[0.0, 100.0]`.
    pub overall: f64,
    pub verified_count: usize,
    pub doubtful_count: usize,
    pub fake_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl TrustScore {
    pub fn total_claims(&self) -> usize {
        self.verified_count + self.doubtful_count + self.fake_count
    }
}
