use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::models::claim::Claim;
use crate::models::verification::EngineKind;
use crate::verification::{EngineError, EngineOutcome, VerificationContext, VerificationEngine};

/// Score when a profile URL is supplied. No profile fetching happens yet.
pub const PROFILE_SUPPLIED_SCORE: f64 = 0.75;
pub const NO_PROFILE_SCORE: f64 = 0.5;

/// LinkedIn profile match for education and experience claims.
///
/// Placeholder boundary: the score depends only on whether a profile URL
/// was supplied. Swap in a real matcher behind the same engine kind.
pub struct LinkedInEngine;

#[async_trait]
impl VerificationEngine for LinkedInEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Linkedin
    }

    async fn check(
        &self,
        claim: &Claim,
        ctx: &VerificationContext,
    ) -> Result<EngineOutcome, EngineError> {
        let url = ctx
            .linkedin_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let outcome = match url {
            Some(url) => EngineOutcome::new(
                PROFILE_SUPPLIED_SCORE,
                json!({ "linkedin_url": url, "status": "partially_matched" }),
            ),
            None => EngineOutcome::new(
                NO_PROFILE_SCORE,
                json!({
                    "linkedin_url": null,
                    "status": "unverified",
                    "message": "LinkedIn URL not provided",
                }),
            ),
        };

        info!(
            "LinkedIn verification for {} claim: {:.2}",
            claim.kind, outcome.score
        );
        Ok(outcome)
    }
}
