use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a factual assertion pulled out of a resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Skill,
    Education,
    Experience,
    Certification,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 4] = [
        ClaimKind::Skill,
        ClaimKind::Education,
        ClaimKind::Experience,
        ClaimKind::Certification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::Skill => "skill",
            ClaimKind::Education => "education",
            ClaimKind::Experience => "experience",
            ClaimKind::Certification => "certification",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte offsets of the match inside the cleaned document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A single claim extracted from one document. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub kind: ClaimKind,
    pub text: String,
    /// Fixed per-category extraction confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub span: Span,
    pub section: String,
    pub entities: BTreeMap<String, String>,
}

impl Claim {
    pub fn new(
        kind: ClaimKind,
        text: impl Into<String>,
        confidence: f64,
        span: Span,
        section: impl Into<String>,
        entities: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            span,
            section: section.into(),
            entities,
        }
    }

    /// Case- and whitespace-insensitive key used to spot repeated claims.
    pub fn normalized_text(&self) -> String {
        self.text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
