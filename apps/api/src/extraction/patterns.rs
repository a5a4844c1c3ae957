//! Pattern scanners, one independent regex pass per claim category.
//!
//! Overlapping or repeated matches are all kept; nothing here deduplicates.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::models::claim::{Claim, ClaimKind, Span};

pub const SKILL_CONFIDENCE: f64 = 0.90;
pub const EDUCATION_CONFIDENCE: f64 = 0.85;
pub const EXPERIENCE_CONFIDENCE: f64 = 0.80;
pub const CERTIFICATION_CONFIDENCE: f64 = 0.88;

/// Curated skill vocabulary, grouped by the section name stored on each claim.
pub const SKILL_VOCABULARY: &[(&str, &[&str])] = &[
    (
        "programming_languages",
        &[
            "Python",
            "JavaScript",
            "Java",
            "C++",
            "C#",
            "Go",
            "Rust",
            "PHP",
            "Ruby",
            "Swift",
            "Kotlin",
            "TypeScript",
            "SQL",
        ],
    ),
    (
        "frameworks",
        &[
            "React",
            "Angular",
            "Vue",
            "Django",
            "Flask",
            "FastAPI",
            "Spring",
            ".NET",
            "Node.js",
            "Express",
            "TensorFlow",
            "PyTorch",
        ],
    ),
    (
        "tools",
        &[
            "Docker",
            "Kubernetes",
            "Git",
            "Jenkins",
            "AWS",
            "GCP",
            "Azure",
            "Linux",
            "Windows",
            "macOS",
            "Terraform",
            "PostgreSQL",
        ],
    ),
];

static SKILL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SKILL_VOCABULARY
        .iter()
        .flat_map(|(category, skills)| {
            skills.iter().map(move |skill| {
                let pattern = format!("(?i){}", regex::escape(skill));
                (*category, Regex::new(&pattern).unwrap())
            })
        })
        .collect()
});

/// `<degree> ... [from|at|in] <Institution ending in University|College|Institute|School>`
static EDUCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(Bachelor|Master|PhD|Ph\.D\.|Associate|B\.S\.|M\.S\.|B\.A\.|M\.A\.|B\.Sc|M\.Sc|MBA))(?:.{0,80}?)(?:\b(?i:from|at|in)\s+|,\s*|\s+)((?:[A-Z][A-Za-z&.]*\s+){0,4}(?:University|College|Institute|School)(?:\s+of\s+[A-Z][A-Za-z]+)?)",
    )
    .unwrap()
});

/// `[seniority] <title> at|for <Company>` followed by a terminator.
static EXPERIENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(?:(Senior|Lead|Principal|Junior|Staff)\s+)?(Software Engineer|Software Developer|Data Scientist|Product Manager|Engineering Manager|Developer|Engineer|Manager))\s+(?i:at|for)\s+([A-Z][A-Za-z0-9&]*(?:\s+[A-Z][A-Za-z0-9&]*){0,3}?)(?:\s+-|\s+\||\s*,|\s+\(|\s+(?i:experience|worked|from|since)\b|\s+\d|\s*$)",
    )
    .unwrap()
});

/// Vendor-prefixed certification, or `Certified <Name>`.
static CERTIFICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(?:(AWS|GCP|Google Cloud|Azure|Microsoft|Oracle|Cisco|CompTIA|Salesforce|Kubernetes|PMI)\b[\w &-]{0,40}?\b(?:Certification|Certified|Certificate)|(Certified))\b)(\s+[A-Z][\w&]*(?:\s+[A-Z][\w&]*){0,5})?",
    )
    .unwrap()
});

/// True when `text[start..end]` is not glued to neighbouring word characters.
fn is_token_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true);
    let after_ok = text[end..]
        .chars()
        .next()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true);
    before_ok && after_ok
}

fn span_of(caps: &Captures<'_>) -> Option<Span> {
    caps.get(0).map(|m| Span {
        start: m.start(),
        end: m.end(),
    })
}

fn capture<'t>(caps: &Captures<'t>, idx: usize) -> Option<&'t str> {
    caps.get(idx).map(|m| m.as_str().trim()).filter(|s| !s.is_empty())
}

pub fn extract_skills(text: &str) -> Vec<Claim> {
    let mut claims = Vec::new();
    for (category, re) in SKILL_PATTERNS.iter() {
        for m in re.find_iter(text) {
            if !is_token_boundary(text, m.start(), m.end()) {
                continue;
            }
            let mut entities = BTreeMap::new();
            entities.insert("category".to_string(), category.to_string());
            claims.push(Claim::new(
                ClaimKind::Skill,
                m.as_str(),
                SKILL_CONFIDENCE,
                Span {
                    start: m.start(),
                    end: m.end(),
                },
                *category,
                entities,
            ));
        }
    }
    debug!("Extracted {} skill claims", claims.len());
    claims
}

pub fn extract_education(text: &str) -> Vec<Claim> {
    let claims: Vec<Claim> = EDUCATION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let degree = capture(&caps, 1)?;
            let institution = capture(&caps, 2)?;
            let mut entities = BTreeMap::new();
            entities.insert("degree".to_string(), degree.to_string());
            entities.insert("university".to_string(), institution.to_string());
            Some(Claim::new(
                ClaimKind::Education,
                format!("{degree} from {institution}"),
                EDUCATION_CONFIDENCE,
                span_of(&caps)?,
                "education",
                entities,
            ))
        })
        .collect();
    debug!("Extracted {} education claims", claims.len());
    claims
}

pub fn extract_experience(text: &str) -> Vec<Claim> {
    let claims: Vec<Claim> = EXPERIENCE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let role = capture(&caps, 2)?;
            let company = capture(&caps, 3)?;
            let title = match capture(&caps, 1) {
                Some(level) => format!("{level} {role}"),
                None => role.to_string(),
            };
            let mut entities = BTreeMap::new();
            entities.insert("title".to_string(), title.clone());
            entities.insert("company".to_string(), company.to_string());
            Some(Claim::new(
                ClaimKind::Experience,
                format!("{title} at {company}"),
                EXPERIENCE_CONFIDENCE,
                span_of(&caps)?,
                "experience",
                entities,
            ))
        })
        .collect();
    debug!("Extracted {} experience claims", claims.len());
    claims
}

pub fn extract_certifications(text: &str) -> Vec<Claim> {
    let claims: Vec<Claim> = CERTIFICATION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            // A bare "certified" with nothing after it is not a claim.
            if caps.get(2).is_some() && caps.get(3).is_none() {
                return None;
            }
            let name = caps.get(0)?.as_str().trim().to_string();
            let mut entities = BTreeMap::new();
            entities.insert("name".to_string(), name.clone());
            if let Some(vendor) = capture(&caps, 1) {
                entities.insert("vendor".to_string(), vendor.to_string());
            }
            Some(Claim::new(
                ClaimKind::Certification,
                name,
                CERTIFICATION_CONFIDENCE,
                span_of(&caps)?,
                "certifications",
                entities,
            ))
        })
        .collect();
    debug!("Extracted {} certification claims", claims.len());
    claims
}

/// Runs every category scan over the same text and concatenates the results.
pub fn extract_all(text: &str) -> Vec<Claim> {
    ClaimKind::ALL
        .into_iter()
        .flat_map(|kind| extract_kind(kind, text))
        .collect()
}

/// The scanner responsible for `kind`.
fn extract_kind(kind: ClaimKind, text: &str) -> Vec<Claim> {
    match kind {
        ClaimKind::Skill => extract_skills(text),
        ClaimKind::Education => extract_education(text),
        ClaimKind::Experience => extract_experience(text),
        ClaimKind::Certification => extract_certifications(text),
    }
}
