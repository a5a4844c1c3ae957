// Entity tagger LLM prompt templates.

pub const ENTITY_TAG_PROMPT: &str = r#"Tag the named entities in the following resume text.

RESUME TEXT:
{resume_text}

OUTPUT SCHEMA (return exactly this structure, omit labels with no entities):
{
  "ORG": ["companies, universities, certification issuers"],
  "PERSON": ["people"],
  "DATE": ["dates and date ranges exactly as written"],
  "GPE": ["cities, countries"],
  "SKILL": ["technologies, languages, tools"]
}

Copy entity text verbatim from the input. Do not invent entities."#;
