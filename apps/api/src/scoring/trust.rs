use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::prediction::{Prediction, TrustScore, TruthLabel};

/// Score reported for a document with no scored claims.
pub const NEUTRAL_TRUST: f64 = 50.0;
const BASE: f64 = 20.0;
const VERIFIED_WEIGHT: f64 = 75.0;

/// Reduces per-claim predictions to one 0 to 100 trust score:
/// `clamp(20 + 75 × verified / total, 0, 100)`, or 50 when empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustScoreAggregator;

impl TrustScoreAggregator {
    pub fn aggregate(&self, predictions: &[Prediction]) -> TrustScore {
        self.aggregate_at(predictions, Utc::now())
    }

    /// Pure form of [`aggregate`](Self::aggregate) with a fixed timestamp.
    pub fn aggregate_at(&self, predictions: &[Prediction], now: DateTime<Utc>) -> TrustScore {
        let count = |label: TruthLabel| predictions.iter().filter(|p| p.label == label).count();
        let verified_count = count(TruthLabel::Verified);
        let doubtful_count = count(TruthLabel::Doubtful);
        let fake_count = count(TruthLabel::Fake);

        let overall = if predictions.is_empty() {
            NEUTRAL_TRUST
        } else {
            let ratio = verified_count as f64 / predictions.len() as f64;
            (BASE + VERIFIED_WEIGHT * ratio).clamp(0.0, 100.0)
        };

        info!(
            "Trust score {:.1} ({} verified, {} doubtful, {} fake)",
            overall, verified_count, doubtful_count, fake_count
        );

        TrustScore {
            overall,
            verified_count,
            doubtful_count,
            fake_count,
            generated_at: now,
        }
    }
}
