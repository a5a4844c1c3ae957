use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::extraction::prompts::ENTITY_TAG_PROMPT;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};

/// Entity label (ORG, DATE, SKILL, ...) → entity texts in document order.
pub type EntityMap = BTreeMap<String, Vec<String>>;

/// Upper bound on characters sent to the tagger per document.
const MAX_TAGGED_CHARS: usize = 12_000;

#[derive(Debug, Error)]
pub enum TaggerError {
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Named-entity recognizer used to enrich pattern extraction.
#[async_trait]
pub trait EntityTagger: Send + Sync {
    fn name(&self) -> &'static str;

    async fn tag(&self, text: &str) -> Result<EntityMap, TaggerError>;
}

/// Tags entities through the shared LLM client.
pub struct LlmEntityTagger {
    llm: LlmClient,
}

impl LlmEntityTagger {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl EntityTagger for LlmEntityTagger {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn tag(&self, text: &str) -> Result<EntityMap, TaggerError> {
        let excerpt = truncate_chars(text, MAX_TAGGED_CHARS);
        let prompt = ENTITY_TAG_PROMPT.replace("{resume_text}", excerpt);
        let raw: EntityMap = self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await?;

        let entities = normalize_entities(raw);
        debug!(
            "Tagged {} entities across {} labels",
            entities.values().map(Vec::len).sum::<usize>(),
            entities.len()
        );
        Ok(entities)
    }
}

/// Longest prefix of `text` holding at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Uppercases labels, trims entity texts and drops empties.
fn normalize_entities(raw: EntityMap) -> EntityMap {
    let mut out: EntityMap = BTreeMap::new();
    for (label, values) in raw {
        let values: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        out.entry(label.trim().to_uppercase())
            .or_default()
            .extend(values);
    }
    out
}
