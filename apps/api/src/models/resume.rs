use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::prediction::TrustScore;
use crate::pipeline::PipelineReport;

/// Processing lifecycle of an uploaded resume.
///
/// uploaded → extracting → verifying → scoring → completed,
/// with `failed` and `cancelled` as the other terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Uploaded,
    Extracting,
    Verifying,
    Scoring,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Uploaded => "uploaded",
            ProcessingStage::Extracting => "extracting",
            ProcessingStage::Verifying => "verifying",
            ProcessingStage::Scoring => "scoring",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
            ProcessingStage::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Completed | ProcessingStage::Failed | ProcessingStage::Cancelled
        )
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(ProcessingStage::Uploaded),
            "extracting" => Ok(ProcessingStage::Extracting),
            "verifying" => Ok(ProcessingStage::Verifying),
            "scoring" => Ok(ProcessingStage::Scoring),
            "completed" => Ok(ProcessingStage::Completed),
            "failed" => Ok(ProcessingStage::Failed),
            "cancelled" => Ok(ProcessingStage::Cancelled),
            other => Err(format!("unknown processing stage '{other}'")),
        }
    }
}

/// A stored resume and, once processed, its full verification report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub stage: ProcessingStage,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Computed once per pipeline run; reads never recompute it.
    pub trust_score: Option<TrustScore>,
    pub report: Option<PipelineReport>,
}

impl ResumeRecord {
    pub fn new(owner_id: Uuid, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            filename: filename.into(),
            stage: ProcessingStage::Uploaded,
            uploaded_at: now,
            updated_at: now,
            error: None,
            trust_score: None,
            report: None,
        }
    }

    pub fn advance(&mut self, stage: ProcessingStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.advance(ProcessingStage::Failed);
    }

    pub fn complete(&mut self, report: PipelineReport) {
        self.trust_score = Some(report.trust_score.clone());
        self.report = Some(report);
        self.error = None;
        self.advance(ProcessingStage::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_starts_uploaded() {
        let record = ResumeRecord::new(Uuid::new_v4(), "cv.pdf");
        assert_eq!(record.stage, ProcessingStage::Uploaded);
        assert!(record.trust_score.is_none());
        assert_eq!(record.uploaded_at, record.updated_at);
    }

    #[test]
    fn test_stage_round_trips_through_str() {
        for stage in [
            ProcessingStage::Uploaded,
            ProcessingStage::Extracting,
            ProcessingStage::Verifying,
            ProcessingStage::Scoring,
            ProcessingStage::Completed,
            ProcessingStage::Failed,
            ProcessingStage::Cancelled,
        ] {
            assert_eq!(stage.as_str().parse::<ProcessingStage>().unwrap(), stage);
        }
        assert!("archived".parse::<ProcessingStage>().is_err());
    }

    #[test]
    fn test_fail_records_error_and_is_terminal() {
        let mut record = ResumeRecord::new(Uuid::new_v4(), "cv.docx");
        record.fail("Unsupported file format: .docx");
        assert_eq!(record.stage, ProcessingStage::Failed);
        assert!(record.stage.is_terminal());
        assert_eq!(record.error.as_deref(), Some("Unsupported file format: .docx"));
    }
}
