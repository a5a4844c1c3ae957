//! Claim extraction: document intake, pattern scanners and the optional entity tagger.

pub mod document;
pub mod patterns;
pub mod prompts;
pub mod tagger;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::extraction::tagger::{EntityMap, EntityTagger};
use crate::models::claim::Claim;

/// Whether the entity tagger contributed to an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Patterns plus entity tagging.
    Full,
    /// Tagger missing or failed; patterns only.
    PatternOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub claims: Vec<Claim>,
    pub entities: EntityMap,
    pub mode: ExtractionMode,
}

/// Turns cleaned resume text into typed claims.
#[derive(Clone)]
pub struct ClaimExtractor {
    tagger: Option<Arc<dyn EntityTagger>>,
}

impl ClaimExtractor {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self {
            tagger: Some(tagger),
        }
    }

    pub fn pattern_only() -> Self {
        Self { tagger: None }
    }

    /// Runs every pattern scan, then the entity tagger if one is configured.
    ///
    /// A tagger failure never fails extraction: the result is flagged
    /// `PatternOnly` instead.
    pub async fn extract(&self, text: &str) -> Extraction {
        let claims = patterns::extract_all(text);

        let (entities, mode) = match &self.tagger {
            None => (BTreeMap::new(), ExtractionMode::PatternOnly),
            Some(tagger) => match tagger.tag(text).await {
                Ok(entities) => (entities, ExtractionMode::Full),
                Err(e) => {
                    warn!(
                        tagger = tagger.name(),
                        error = %e,
                        "Entity tagging failed; degrading to pattern-only extraction"
                    );
                    (BTreeMap::new(), ExtractionMode::PatternOnly)
                }
            },
        };

        info!(
            "Total claims extracted: {} (mode: {:?}, entity labels: {})",
            claims.len(),
            mode,
            entities.len()
        );

        Extraction {
            claims,
            entities,
            mode,
        }
    }
}
