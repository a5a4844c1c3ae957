//! Timeline consistency: date ranges in the document must be well-formed
//! and must not overlap one another.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::models::claim::Claim;
use crate::models::verification::EngineKind;
use crate::verification::{EngineError, EngineOutcome, VerificationContext, VerificationEngine};

pub const CONFLICT_PENALTY: f64 = 0.15;

const MONTH: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

/// `Mon YYYY - Mon YYYY`, `YYYY - YYYY`, `Mon YYYY to Present`, ...
static DATE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:(?P<sm>{MONTH})\.?\s+)?(?P<sy>(?:19|20)\d{{2}})\s*(?:-|–|—|to)\s*(?:(?:(?P<em>{MONTH})\.?\s+)?(?P<ey>(?:19|20)\d{{2}})|(?P<open>present|current|now))\b"
    ))
    .unwrap()
});

/// A half-open employment/study interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Matched source text.
    pub label: String,
}

impl DateInterval {
    pub fn is_valid(&self) -> bool {
        self.end >= self.start
    }

    pub fn overlaps(&self, other: &DateInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn years(&self) -> f64 {
        (self.end - self.start).num_days() as f64 / 365.25
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineConflict {
    InvalidDateRange {
        range: String,
        message: String,
    },
    OverlappingPositions {
        first: String,
        second: String,
        message: String,
    },
}

fn month_number(name: &str) -> Option<u32> {
    let key: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn date_from(caps: &Captures, month: &str, year: &str) -> Option<NaiveDate> {
    let year: i32 = caps.name(year)?.as_str().parse().ok()?;
    let month = caps
        .name(month)
        .and_then(|m| month_number(m.as_str()))
        .unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Extracts every date range in `text`. Open-ended ranges end on the first
/// of `today`'s month.
pub fn extract_date_ranges(text: &str, today: NaiveDate) -> Vec<DateInterval> {
    DATE_RANGE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let start = date_from(&caps, "sm", "sy")?;
            let end = if caps.name("open").is_some() {
                NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?
            } else {
                date_from(&caps, "em", "ey")?
            };
            Some(DateInterval {
                start,
                end,
                label: caps.get(0)?.as_str().to_string(),
            })
        })
        .collect()
}

/// Flags reversed ranges and every overlapping pair of valid ranges.
pub fn check_timeline_conflicts(intervals: &[DateInterval]) -> Vec<TimelineConflict> {
    let mut conflicts: Vec<TimelineConflict> = intervals
        .iter()
        .filter(|i| !i.is_valid())
        .map(|i| TimelineConflict::InvalidDateRange {
            range: i.label.clone(),
            message: format!("End date {} is before start date {}", i.end, i.start),
        })
        .collect();

    let valid: Vec<&DateInterval> = intervals.iter().filter(|i| i.is_valid()).collect();
    for (idx, a) in valid.iter().enumerate() {
        for b in &valid[idx + 1..] {
            if a.overlaps(b) {
                conflicts.push(TimelineConflict::OverlappingPositions {
                    first: a.label.clone(),
                    second: b.label.clone(),
                    message: "Overlapping employment detected".to_string(),
                });
            }
        }
    }
    conflicts
}

pub fn timeline_penalty(conflict_count: usize) -> f64 {
    (conflict_count as f64 * CONFLICT_PENALTY).min(1.0)
}

pub fn timeline_score(conflict_count: usize) -> f64 {
    (1.0 - conflict_count as f64 * CONFLICT_PENALTY).max(0.0)
}

pub fn total_experience_years(intervals: &[DateInterval]) -> f64 {
    let years: f64 = intervals
        .iter()
        .filter(|i| i.is_valid())
        .map(DateInterval::years)
        .sum();
    (years * 10.0).round() / 10.0
}

/// Runs against the whole document, so every claim sees the same verdict.
pub struct TimelineEngine;

#[async_trait]
impl VerificationEngine for TimelineEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Timeline
    }

    async fn check(
        &self,
        claim: &Claim,
        ctx: &VerificationContext,
    ) -> Result<EngineOutcome, EngineError> {
        let text = ctx.document_text.as_deref().unwrap_or(&claim.text);
        Ok(assess(text, Utc::now().date_naive()))
    }
}

pub fn assess(text: &str, today: NaiveDate) -> EngineOutcome {
    let intervals = extract_date_ranges(text, today);
    let conflicts = check_timeline_conflicts(&intervals);
    let score = timeline_score(conflicts.len());

    if conflicts.is_empty() {
        info!(
            "Timeline validation: {:.2} ({} ranges)",
            score,
            intervals.len()
        );
    } else {
        warn!(
            "Timeline validation: {:.2} (conflicts: {})",
            score,
            conflicts.len()
        );
    }

    EngineOutcome::new(
        score,
        json!({
            "ranges": intervals.len(),
            "conflicts": conflicts,
            "total_experience_years": total_experience_years(&intervals),
            "penalty": timeline_penalty(conflicts.len()),
        }),
    )
}
