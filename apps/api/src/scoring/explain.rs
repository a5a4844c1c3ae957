//! Human-readable reasoning for each claim verdict.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::claim::Claim;
use crate::models::prediction::{Prediction, TruthLabel};
use crate::scoring::features::{Feature, FeatureVector};

/// Features worth surfacing, with the level each is expected to reach.
const REVIEWED_FEATURES: [(Feature, &str, f64); 7] = [
    (Feature::GithubActivity, "GitHub Activity Score", 0.7),
    (Feature::GithubRecency, "GitHub Recency", 0.5),
    (Feature::LinkedinMatch, "LinkedIn Match", 0.6),
    (Feature::CertificateAuthenticity, "Certificate Authenticity", 0.8),
    (Feature::TemporalConsistency, "Timeline Consistency", 0.7),
    (Feature::SourceDocumentQuality, "Document Quality", 0.6),
    (Feature::ClaimSpecificity, "Claim Specificity", 0.5),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub claim_id: Uuid,
    pub claim: String,
    pub prediction: TruthLabel,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    /// Features below half their expected level.
    pub contributing_factors: Vec<String>,
}

pub fn explain(claim: &Claim, features: &FeatureVector, prediction: &Prediction) -> Explanation {
    let contributing_factors = REVIEWED_FEATURES
        .iter()
        .filter_map(|&(feature, label, threshold)| {
            let value = features.get(feature);
            (value < threshold * 0.5)
                .then(|| format!("{label}: {value:.2} (LOW - signals inconsistency)"))
        })
        .collect();

    let mut reasoning = Vec::new();
    match prediction.label {
        TruthLabel::Fake => {
            reasoning.push(format!(
                "Claim '{}' is flagged as FAKE because:",
                claim.text
            ));
            if features.get(Feature::GithubActivity) < 0.3 {
                reasoning.push("  - GitHub shows minimal activity in related repositories".into());
            }
            if features.get(Feature::LinkedinMatch) < 0.4 {
                reasoning.push("  - LinkedIn profile doesn't match claimed experience".into());
            }
            if features.get(Feature::TimelineViolationPenalty) > 0.0 {
                reasoning.push("  - Timeline contains overlapping or invalid date ranges".into());
            }
        }
        TruthLabel::Doubtful => {
            reasoning.push(format!("Claim '{}' is DOUBTFUL because:", claim.text));
            reasoning.push("  - Incomplete verification evidence".into());
        }
        TruthLabel::Verified => {
            reasoning.push(format!(
                "Claim '{}' appears VERIFIED based on:",
                claim.text
            ));
            for (feature, label, threshold) in REVIEWED_FEATURES {
                let value = features.get(feature);
                if value >= threshold {
                    reasoning.push(format!("  - {label}: {value:.2}"));
                }
            }
        }
    }

    Explanation {
        claim_id: claim.id,
        claim: claim.text.clone(),
        prediction: prediction.label,
        confidence: prediction.confidence,
        reasoning,
        contributing_factors,
    }
}
