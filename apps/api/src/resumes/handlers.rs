use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::document::{is_supported, ALLOWED_EXTENSIONS};
use crate::models::prediction::TrustScore;
use crate::models::resume::{ProcessingStage, ResumeRecord};
use crate::pipeline::DocumentSource;
use crate::state::AppState;
use crate::verification::github::is_valid_login;
use crate::verification::{CertificateImage, VerificationContext};

/// Largest certificate image accepted with an upload.
pub const MAX_CERTIFICATE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub resume_id: Uuid,
    pub status: ProcessingStage,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTextRequest {
    pub owner_id: Uuid,
    #[serde(default = "default_text_filename")]
    pub filename: String,
    pub text: String,
    #[serde(default)]
    pub context: VerificationContext,
}

fn default_text_filename() -> String {
    "resume.txt".to_string()
}

/// A resume without its full report.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResumeSummary {
    pub id: Uuid,
    pub filename: String,
    pub stage: ProcessingStage,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trust_score: Option<f64>,
    pub error: Option<String>,
}

impl From<&ResumeRecord> for ResumeSummary {
    fn from(r: &ResumeRecord) -> Self {
        Self {
            id: r.id,
            filename: r.filename.clone(),
            stage: r.stage,
            uploaded_at: r.uploaded_at,
            updated_at: r.updated_at,
            trust_score: r.trust_score.as_ref().map(|t| t.overall),
            error: r.error.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_resumes: usize,
    pub completed: usize,
    pub processing: usize,
    pub failed: usize,
    pub average_trust_score: Option<f64>,
    pub total_claims: usize,
    pub verified_claims: usize,
    pub fake_claims: usize,
}

/// Rejects hints that would be unsafe to hand to an engine.
fn check_context(ctx: &VerificationContext) -> Result<(), AppError> {
    if let Some(username) = ctx.github_username.as_deref().map(str::trim) {
        if !username.is_empty() && !is_valid_login(username) {
            return Err(AppError::Validation("Invalid GitHub username".into()));
        }
    }
    Ok(())
}

async fn accept(
    state: &AppState,
    owner_id: Uuid,
    filename: String,
    source: DocumentSource,
    ctx: VerificationContext,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    check_context(&ctx)?;
    let record = state
        .repository
        .create(ResumeRecord::new(owner_id, filename))
        .await?;
    info!(resume_id = %record.id, owner_id = %owner_id, "Resume accepted for processing");

    let response = SubmitResponse {
        resume_id: record.id,
        status: record.stage,
        message: "Resume uploaded; verification is running in the background".to_string(),
    };
    state.processor().spawn(record, source, ctx);
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /api/v1/resumes
///
/// Multipart fields: `owner_id`, `file`, an optional JSON `context` and an
/// optional `certificate` image.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let mut owner_id: Option<Uuid> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut certificate: Option<CertificateImage> = None;
    let mut ctx = VerificationContext::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "owner_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                let id = raw
                    .trim()
                    .parse()
                    .map_err(|_| AppError::Validation("owner_id must be a UUID".into()))?;
                owner_id = Some(id);
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                upload = Some((filename, bytes.to_vec()));
            }
            "certificate" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                if bytes.len() > MAX_CERTIFICATE_BYTES {
                    return Err(AppError::Validation(format!(
                        "certificate exceeds {} KiB",
                        MAX_CERTIFICATE_BYTES / 1024
                    )));
                }
                if !bytes.is_empty() {
                    certificate = Some(CertificateImage::new(bytes.to_vec()));
                }
            }
            "context" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                if !raw.trim().is_empty() {
                    ctx = serde_json::from_str(&raw)
                        .map_err(|e| AppError::Validation(format!("invalid context: {e}")))?;
                }
            }
            _ => {}
        }
    }

    let owner_id = owner_id.ok_or_else(|| AppError::Validation("owner_id is required".into()))?;
    let (filename, bytes) =
        upload.ok_or_else(|| AppError::Validation("file is required".into()))?;
    if !is_supported(&filename) {
        return Err(AppError::Validation(format!(
            "Unsupported file format '{filename}'; allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if bytes.is_empty() {
        return Err(AppError::Validation("file is empty".into()));
    }

    ctx.certificate = certificate;

    let source = DocumentSource::Upload {
        filename: filename.clone(),
        bytes,
    };
    accept(&state, owner_id, filename, source, ctx).await
}

/// POST /api/v1/resumes/text
pub async fn handle_submit_text(
    State(state): State<AppState>,
    Json(req): Json<SubmitTextRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".into()));
    }
    accept(
        &state,
        req.owner_id,
        req.filename,
        DocumentSource::Text(req.text),
        req.context,
    )
    .await
}

/// GET /api/v1/resumes?owner_id=
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<Vec<ResumeSummary>>, AppError> {
    let records = state.repository.list_by_owner(params.owner_id).await?;
    Ok(Json(records.iter().map(ResumeSummary::from).collect()))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeRecord>, AppError> {
    let record = state
        .repository
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))?;
    Ok(Json(record))
}

/// GET /api/v1/resumes/:id/trust-score
///
/// Serves the score stored by the pipeline run; never recomputes it.
pub async fn handle_get_trust_score(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrustScore>, AppError> {
    let record = state
        .repository
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))?;

    match (record.stage, record.trust_score) {
        (ProcessingStage::Completed, Some(score)) => Ok(Json(score)),
        (ProcessingStage::Failed | ProcessingStage::Cancelled, _) => {
            Err(AppError::UnprocessableEntity(format!(
                "Resume {id} was not scored: {}",
                record.error.as_deref().unwrap_or("processing did not complete")
            )))
        }
        (stage, _) => Err(AppError::Conflict(format!(
            "Resume {id} is {stage}; trust score is available once processing completes"
        ))),
    }
}

/// DELETE /api/v1/resumes/:id
///
/// Erases the record and cancels any processing still running for it.
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let was_running = state.jobs.cancel(id);
    if !state.repository.delete(id).await? {
        return Err(AppError::NotFound(format!("Resume {id} not found")));
    }
    info!(resume_id = %id, was_running, "Resume erased");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/dashboard/stats?owner_id=
pub async fn handle_dashboard_stats(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<DashboardStats>, AppError> {
    let records = state.repository.list_by_owner(params.owner_id).await?;
    Ok(Json(dashboard_stats(&records)))
}

pub fn dashboard_stats(records: &[ResumeRecord]) -> DashboardStats {
    let count = |pred: fn(ProcessingStage) -> bool| records.iter().filter(|r| pred(r.stage)).count();
    let scores: Vec<&TrustScore> = records.iter().filter_map(|r| r.trust_score.as_ref()).collect();

    DashboardStats {
        total_resumes: records.len(),
        completed: count(|s| s == ProcessingStage::Completed),
        processing: count(|s| !s.is_terminal()),
        failed: count(|s| s == ProcessingStage::Failed),
        average_trust_score: (!scores.is_empty())
            .then(|| scores.iter().map(|t| t.overall).sum::<f64>() / scores.len() as f64),
        total_claims: scores.iter().map(|t| t.total_claims()).sum(),
        verified_claims: scores.iter().map(|t| t.verified_count).sum(),
        fake_claims: scores.iter().map(|t| t.fake_count).sum(),
    }
}
