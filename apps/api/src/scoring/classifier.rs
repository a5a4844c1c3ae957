use crate::models::prediction::{Prediction, TruthLabel};
use crate::scoring::features::{Feature, FeatureVector};

/// Maps a claim's feature vector to a verified/doubtful/fake verdict.
///
/// Trained models plug in here; [`EvidenceClassifier`] is the built-in rule.
pub trait TruthClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, features: &FeatureVector) -> Prediction;
}

/// Deterministic weighted-evidence rule over the verification features.
#[derive(Debug, Clone)]
pub struct EvidenceClassifier {
    pub verified_threshold: f64,
    pub doubtful_threshold: f64,
}

impl Default for EvidenceClassifier {
    fn default() -> Self {
        Self {
            verified_threshold: 0.6,
            doubtful_threshold: 0.35,
        }
    }
}

impl EvidenceClassifier {
    /// Mean of the external sources that reported a positive signal.
    pub fn external_evidence(features: &FeatureVector) -> f64 {
        let github = 0.4 * features.get(Feature::GithubActivity)
            + 0.4 * features.get(Feature::LanguageConfidence)
            + 0.2 * features.get(Feature::GithubRecency);
        let sources = [
            github,
            features.get(Feature::LinkedinMatch),
            features.get(Feature::CertificateAuthenticity),
            features.get(Feature::SkillTest),
            features.get(Feature::TemporalConsistency),
        ];

        let present: Vec<f64> = sources.into_iter().filter(|v| *v > 0.0).collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().sum::<f64>() / present.len() as f64
    }

    /// Combined evidence in [0, 1].
    pub fn evidence(features: &FeatureVector) -> f64 {
        let evidence = 0.7 * Self::external_evidence(features)
            + 0.15 * features.get(Feature::SourceDocumentQuality)
            + 0.1 * features.get(Feature::ClaimSpecificity)
            + 0.05 * features.get(Feature::EntityRecognition)
            - 0.5 * features.get(Feature::TimelineViolationPenalty)
            - 0.1 * features.get(Feature::DuplicateClaimCount);
        evidence.clamp(0.0, 1.0)
    }

    fn label_for(&self, evidence: f64) -> (TruthLabel, f64) {
        let (label, certainty) = if evidence >= self.verified_threshold {
            let span = (1.0 - self.verified_threshold).max(f64::EPSILON);
            (
                TruthLabel::Verified,
                (evidence - self.verified_threshold) / span,
            )
        } else if evidence >= self.doubtful_threshold {
            let mid = (self.verified_threshold + self.doubtful_threshold) / 2.0;
            let half = ((self.verified_threshold - self.doubtful_threshold) / 2.0).max(f64::EPSILON);
            (TruthLabel::Doubtful, 1.0 - (evidence - mid).abs() / half)
        } else {
            let span = self.doubtful_threshold.max(f64::EPSILON);
            (TruthLabel::Fake, (self.doubtful_threshold - evidence) / span)
        };
        (label, (0.5 + 0.5 * certainty).clamp(0.0, 1.0))
    }
}

impl TruthClassifier for EvidenceClassifier {
    fn name(&self) -> &'static str {
        "evidence_rule"
    }

    fn classify(&self, features: &FeatureVector) -> Prediction {
        let (label, confidence) = self.label_for(Self::evidence(features));
        Prediction {
            claim_id: features.claim_id,
            label,
            confidence,
        }
    }
}
