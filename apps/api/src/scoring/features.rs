//! Fixed-order numeric features per claim.
//!
//! Downstream classifiers are order-sensitive, so [`Feature::ALL`] is the
//! single source of truth for vector layout: alphabetical by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::tagger::EntityMap;
use crate::models::claim::{Claim, ClaimKind};
use crate::models::verification::{EngineKind, VerificationResult};

pub const FEATURE_COUNT: usize = 12;

/// Assumed maximum number of duplicates when normalizing the count.
const MAX_DUPLICATES: f64 = 5.0;

const EXPECTED_SECTIONS: [&str; 5] = ["experience", "education", "skills", "projects", "certification"];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CertificateAuthenticity,
    ClaimSpecificity,
    DuplicateClaimCount,
    EntityRecognition,
    GithubActivity,
    GithubRecency,
    LanguageConfidence,
    LinkedinMatch,
    SkillTest,
    SourceDocumentQuality,
    TemporalConsistency,
    TimelineViolationPenalty,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::CertificateAuthenticity,
        Feature::ClaimSpecificity,
        Feature::DuplicateClaimCount,
        Feature::EntityRecognition,
        Feature::GithubActivity,
        Feature::GithubRecency,
        Feature::LanguageConfidence,
        Feature::LinkedinMatch,
        Feature::SkillTest,
        Feature::SourceDocumentQuality,
        Feature::TemporalConsistency,
        Feature::TimelineViolationPenalty,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::CertificateAuthenticity => "certificate_authenticity",
            Feature::ClaimSpecificity => "claim_specificity",
            Feature::DuplicateClaimCount => "duplicate_claim_count",
            Feature::EntityRecognition => "entity_recognition",
            Feature::GithubActivity => "github_activity",
            Feature::GithubRecency => "github_recency",
            Feature::LanguageConfidence => "language_confidence",
            Feature::LinkedinMatch => "linkedin_match",
            Feature::SkillTest => "skill_test",
            Feature::SourceDocumentQuality => "source_document_quality",
            Feature::TemporalConsistency => "temporal_consistency",
            Feature::TimelineViolationPenalty => "timeline_violation_penalty",
        }
    }

    /// Position of this feature in every [`FeatureVector`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub claim_id: Uuid,
    /// Indexed by [`Feature::index`]; every value is in [0, 1].
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Values in alphabetical feature order, the layout model inputs expect.
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        self.values
    }

    pub fn named(&self) -> Vec<(&'static str, f64)> {
        Feature::ALL
            .iter()
            .map(Feature::name)
            .zip(self.as_array())
            .collect()
    }
}

/// Document-level signals shared by every claim of one resume.
#[derive(Debug, Clone)]
pub struct ResumeContext {
    pub document_quality: f64,
    /// Tokenized entity texts from the tagger; `None` when it did not run.
    tagged_entities: Option<Vec<Vec<String>>>,
    occurrences: HashMap<(ClaimKind, String), usize>,
}

impl ResumeContext {
    pub fn new(document_text: &str, claims: &[Claim], tagged: Option<&EntityMap>) -> Self {
        let mut occurrences = HashMap::new();
        for claim in claims {
            *occurrences
                .entry((claim.kind, claim.normalized_text()))
                .or_insert(0) += 1;
        }
        let tagged_entities = tagged.map(|map| {
            map.values()
                .flatten()
                .map(|text| tokens(text))
                .filter(|t| significant(t))
                .collect()
        });
        Self {
            document_quality: source_document_quality(document_text),
            tagged_entities,
            occurrences,
        }
    }

    /// The claim's confidence when its text, or one of its captured
    /// fields, names an entity the tagger found. Zero otherwise.
    pub fn entity_recognition(&self, claim: &Claim) -> f64 {
        let Some(tagged) = &self.tagged_entities else {
            return 0.0;
        };
        let recognized = std::iter::once(&claim.text)
            .chain(claim.entities.values())
            .map(|text| tokens(text))
            .filter(|t| significant(t))
            .any(|candidate| {
                tagged.iter().any(|entity| {
                    contains_run(entity, &candidate) || contains_run(&candidate, entity)
                })
            });
        if recognized {
            claim.confidence
        } else {
            0.0
        }
    }

    /// Other claims of the same kind with the same case-insensitive text.
    pub fn duplicates_of(&self, claim: &Claim) -> usize {
        self.occurrences
            .get(&(claim.kind, claim.normalized_text()))
            .map(|n| n.saturating_sub(1))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn build(
        &self,
        claim: &Claim,
        results: &[VerificationResult],
        ctx: &ResumeContext,
    ) -> FeatureVector {
        let result = |source: EngineKind| results.iter().find(|r| r.source == source);
        let score = |source: EngineKind| result(source).map(|r| r.score).unwrap_or(0.0);
        let evidence = |source: EngineKind, key: &str| {
            result(source)
                .and_then(|r| r.evidence_f64(key))
                .unwrap_or(0.0)
        };

        let mut values = [0.0; FEATURE_COUNT];
        let mut set = |feature: Feature, value: f64| {
            values[feature.index()] = if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            };
        };

        set(Feature::CertificateAuthenticity, score(EngineKind::Certificate));
        set(Feature::ClaimSpecificity, claim_specificity(&claim.text));
        set(
            Feature::DuplicateClaimCount,
            ctx.duplicates_of(claim) as f64 / MAX_DUPLICATES,
        );
        set(Feature::EntityRecognition, ctx.entity_recognition(claim));
        set(
            Feature::GithubActivity,
            evidence(EngineKind::Github, "activity_score"),
        );
        set(
            Feature::GithubRecency,
            evidence(EngineKind::Github, "recency_score"),
        );
        set(
            Feature::LanguageConfidence,
            evidence(EngineKind::Github, "language_match_score"),
        );
        set(Feature::LinkedinMatch, score(EngineKind::Linkedin));
        set(Feature::SkillTest, score(EngineKind::SkillTest));
        set(Feature::SourceDocumentQuality, ctx.document_quality);
        set(Feature::TemporalConsistency, score(EngineKind::Timeline));
        set(
            Feature::TimelineViolationPenalty,
            evidence(EngineKind::Timeline, "penalty"),
        );

        FeatureVector {
            claim_id: claim.id,
            values,
        }
    }
}

/// Lowercased words with surrounding punctuation removed.
fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Single letters match too much to count.
fn significant(tokens: &[String]) -> bool {
    tokens.iter().map(|t| t.chars().count()).sum::<usize>() >= 2
}

/// Whether `needle` appears as a contiguous run of words in `hay`.
fn contains_run(hay: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && needle.len() <= hay.len() && hay.windows(needle.len()).any(|w| w == needle)
}

/// Structural quality of the raw document: length, sections, contact
/// details, dates and links.
pub fn source_document_quality(text: &str) -> f64 {
    let mut score = 0.0;

    let words = text.split_whitespace().count();
    if (200..=2000).contains(&words) {
        score += 0.2;
    }

    let lower = text.to_lowercase();
    let sections = EXPECTED_SECTIONS
        .iter()
        .filter(|s| lower.contains(*s))
        .count();
    score += sections as f64 / EXPECTED_SECTIONS.len() as f64 * 0.3;

    if EMAIL_RE.is_match(text) {
        score += 0.2;
    }
    if YEAR_RE.is_match(text) {
        score += 0.15;
    }
    if URL_RE.is_match(text) {
        score += 0.15;
    }
    score.min(1.0)
}

pub fn claim_specificity(text: &str) -> f64 {
    let length = (text.chars().count() as f64 / 100.0).min(0.5);
    let digits = if text.chars().any(|c| c.is_ascii_digit()) {
        0.25
    } else {
        0.0
    };
    let proper_nouns = if text
        .split_whitespace()
        .any(|w| w.chars().next().is_some_and(char::is_uppercase))
    {
        0.25
    } else {
        0.0
    };
    (length + digits + proper_nouns).min(1.0)
}
