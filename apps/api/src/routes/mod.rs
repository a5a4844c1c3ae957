pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::resumes::handlers;
use crate::state::AppState;
use crate::verification::handlers::handle_verify_github;

/// Uploads larger than this are rejected before parsing.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resumes
        .route(
            "/api/v1/resumes",
            post(handlers::handle_upload).get(handlers::handle_list_resumes),
        )
        .route("/api/v1/resumes/text", post(handlers::handle_submit_text))
        .route(
            "/api/v1/resumes/:id",
            get(handlers::handle_get_resume).delete(handlers::handle_delete_resume),
        )
        .route(
            "/api/v1/resumes/:id/trust-score",
            get(handlers::handle_get_trust_score),
        )
        // Ad-hoc verification
        .route(
            "/api/v1/verify/github/:username",
            post(handle_verify_github),
        )
        .route(
            "/api/v1/dashboard/stats",
            get(handlers::handle_dashboard_stats),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::models::resume::ResumeRecord;
    use crate::pipeline::tests::{offline_pipeline, RESUME};
    use crate::resumes::handlers::MAX_CERTIFICATE_BYTES;
    use crate::resumes::jobs::JobRegistry;
    use crate::resumes::repository::InMemoryResumeRepository;

    fn test_state() -> AppState {
        AppState {
            config: Config::default(),
            repository: Arc::new(InMemoryResumeRepository::new()),
            pipeline: Arc::new(offline_pipeline()),
            jobs: JobRegistry::new(),
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Form parts as `(name, filename, content)`.
    fn multipart_parts(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let boundary = "verify-boundary";
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            let disposition = match filename {
                Some(f) => format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                ),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/resumes")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn multipart(owner_id: Uuid, filename: &str, content: &str) -> Request<Body> {
        let owner = owner_id.to_string();
        multipart_parts(&[
            ("owner_id", None, owner.as_bytes()),
            ("file", Some(filename), content.as_bytes()),
        ])
    }

    /// Certificate engine results across every claim of a settled record.
    fn certificate_results(record: &Value) -> Vec<Value> {
        record["report"]["verifications"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|v| v["results"].as_array().unwrap().clone())
            .filter(|r| r["source"] == "certificate")
            .collect()
    }

    async fn wait_until_settled(state: &AppState, id: &str) -> Value {
        for _ in 0..200 {
            let (_, body) = send(state, get(&format!("/api/v1/resumes/{id}"))).await;
            if ["completed", "failed", "cancelled"].contains(&body["stage"].as_str().unwrap_or("")) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("resume {id} never settled");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&test_state(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn test_text_submission_runs_to_completion() {
        let state = test_state();
        let owner = Uuid::new_v4();
        let (status, body) = send(
            &state,
            post_json(
                "/api/v1/resumes/text",
                json!({ "owner_id": owner, "text": RESUME }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "uploaded");
        let id = body["resume_id"].as_str().unwrap().to_string();

        let record = wait_until_settled(&state, &id).await;
        assert_eq!(record["stage"], "completed");

        let (status, score) = send(&state, get(&format!("/api/v1/resumes/{id}/trust-score"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(score, record["trust_score"]);

        let (status, list) = send(&state, get(&format!("/api/v1/resumes?owner_id={owner}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (_, stats) = send(&state, get(&format!("/api/v1/dashboard/stats?owner_id={owner}"))).await;
        assert_eq!(stats["total_resumes"], 1);
        assert_eq!(stats["completed"], 1);
    }

    #[tokio::test]
    async fn test_multipart_upload_accepted() {
        let state = test_state();
        let (status, body) = send(&state, multipart(Uuid::new_v4(), "cv.txt", RESUME)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["resume_id"].as_str().unwrap().to_string();
        let record = wait_until_settled(&state, &id).await;
        assert_eq!(record["filename"], "cv.txt");
        assert_eq!(record["stage"], "completed");
    }

    #[tokio::test]
    async fn test_disallowed_extension_is_rejected() {
        let (status, body) = send(&test_state(), multipart(Uuid::new_v4(), "cv.rtf", "x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_uploaded_certificate_is_inspected() {
        let state = test_state();
        let owner = Uuid::new_v4().to_string();
        let request = multipart_parts(&[
            ("owner_id", None, owner.as_bytes()),
            ("file", Some("cv.txt"), RESUME.as_bytes()),
            ("certificate", Some("aws.png"), &b"\x89PNG\r\n\x1a\n0000"[..]),
        ]);
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let record = wait_until_settled(&state, body["resume_id"].as_str().unwrap()).await;
        let results = certificate_results(&record);
        assert!(!results.is_empty());
        for r in &results {
            assert_eq!(r["evidence"]["image_provided"], true);
            assert_eq!(r["evidence"]["features"]["format"], "png");
        }
    }

    #[tokio::test]
    async fn test_oversized_certificate_is_rejected() {
        let owner = Uuid::new_v4().to_string();
        let huge = vec![0u8; MAX_CERTIFICATE_BYTES + 1];
        let request = multipart_parts(&[
            ("owner_id", None, owner.as_bytes()),
            ("certificate", Some("big.png"), huge.as_slice()),
            ("file", Some("cv.txt"), RESUME.as_bytes()),
        ]);
        let (status, body) = send(&test_state(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("certificate exceeds"));
    }

    #[tokio::test]
    async fn test_certificate_path_in_context_is_ignored() {
        let state = test_state();
        let (status, body) = send(
            &state,
            post_json(
                "/api/v1/resumes/text",
                json!({
                    "owner_id": Uuid::new_v4(),
                    "text": RESUME,
                    "context": { "certificate_image": "/etc/passwd" },
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let record = wait_until_settled(&state, body["resume_id"].as_str().unwrap()).await;
        let results = certificate_results(&record);
        assert!(!results.is_empty());
        for r in &results {
            assert_eq!(r["evidence"]["image_provided"], false);
            assert!(r.get("error").is_none());
        }
    }

    #[tokio::test]
    async fn test_malformed_github_username_is_rejected() {
        let (status, body) = send(
            &test_state(),
            post_json(
                "/api/v1/resumes/text",
                json!({
                    "owner_id": Uuid::new_v4(),
                    "text": RESUME,
                    "context": { "github_username": "../user/emails?x=" },
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Invalid GitHub username");

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/verify/github/bad..name?skill=Rust")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&test_state(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trust_score_conflicts_until_completed() {
        let state = test_state();
        let record = state
            .repository
            .create(ResumeRecord::new(Uuid::new_v4(), "cv.pdf"))
            .await
            .unwrap();
        let (status, body) =
            send(&state, get(&format!("/api/v1/resumes/{}/trust-score", record.id))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_trust_score_of_failed_resume_is_422() {
        let state = test_state();
        let mut record = ResumeRecord::new(Uuid::new_v4(), "cv.pdf");
        record.fail("Failed to extract PDF text: bad xref");
        let record = state.repository.create(record).await.unwrap();
        let (status, body) =
            send(&state, get(&format!("/api/v1/resumes/{}/trust-score", record.id))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("bad xref"));
    }

    #[tokio::test]
    async fn test_unknown_resume_is_404() {
        let (status, _) = send(
            &test_state(),
            get(&format!("/api/v1/resumes/{}", Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_erases_record() {
        let state = test_state();
        let record = state
            .repository
            .create(ResumeRecord::new(Uuid::new_v4(), "cv.pdf"))
            .await
            .unwrap();
        let rx = state.jobs.register(record.id);
        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/resumes/{}", record.id))
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(&state, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(*rx.borrow());

        let (status, _) = send(&state, get(&format!("/api/v1/resumes/{}", record.id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_github_verify_reports_engine_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/verify/github/ghost?skill=Rust")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&test_state(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "github");
        assert_eq!(body["score"], 0.0);
        assert_eq!(body["error"], "GitHub user ghost not found");
    }
}
