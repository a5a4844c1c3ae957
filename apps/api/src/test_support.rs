//! Loopback HTTP stub for driving the outbound clients in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};

/// One request as the stub saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Method and origin-form target, e.g. `GET /users/octocat`.
    pub line: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

struct Stub {
    replies: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct StubServer {
    pub base_url: String,
    stub: Arc<Stub>,
}

impl StubServer {
    /// Answers with `replies` in order, one per request, then with 500s.
    pub async fn start(replies: Vec<(u16, String)>) -> Self {
        let stub = Arc::new(Stub {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(reply).with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, stub }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.stub.requests.lock().unwrap().clone()
    }
}

async fn reply(
    State(stub): State<Arc<Stub>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    stub.requests.lock().unwrap().push(RecordedRequest {
        line: format!("{method} {uri}"),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    let (status, body) = stub
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, r#"{"error":"no reply queued"}"#.to_string()));

    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}
