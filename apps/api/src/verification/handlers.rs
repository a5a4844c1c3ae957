use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::extraction::patterns::SKILL_CONFIDENCE;
use crate::models::claim::{Claim, ClaimKind, Span};
use crate::models::verification::{EngineKind, VerificationResult};
use crate::state::AppState;
use crate::verification::github::is_valid_login;
use crate::verification::VerificationContext;

#[derive(Debug, Deserialize)]
pub struct GitHubVerifyQuery {
    pub skill: Option<String>,
}

/// POST /api/v1/verify/github/:username
///
/// Runs the GitHub engine alone for an ad-hoc skill claim. Engine failures
/// come back as a score-0 result, not an HTTP error.
pub async fn handle_verify_github(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<GitHubVerifyQuery>,
) -> Result<Json<VerificationResult>, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("username must not be empty".into()));
    }
    if !is_valid_login(username) {
        return Err(AppError::Validation("Invalid GitHub username".into()));
    }

    let skill = params.skill.unwrap_or_default();
    let claim = Claim::new(
        ClaimKind::Skill,
        skill.trim(),
        SKILL_CONFIDENCE,
        Span {
            start: 0,
            end: skill.len(),
        },
        "request",
        BTreeMap::new(),
    );
    let ctx = VerificationContext {
        github_username: Some(username.to_string()),
        ..Default::default()
    };

    let result = state
        .pipeline
        .orchestrator()
        .run_engine(EngineKind::Github, &claim, &ctx)
        .await;
    Ok(Json(result))
}
