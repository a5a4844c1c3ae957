//! GitHub activity engine: profile activity, recency and language usage.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::models::claim::Claim;
use crate::models::verification::EngineKind;
use crate::verification::{EngineError, EngineOutcome, VerificationContext, VerificationEngine};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Alphanumerics and hyphens, not leading with a hyphen, at most 39 long.
static LOGIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})$").unwrap());

const ACTIVITY_WEIGHT: f64 = 0.4;
const LANGUAGE_WEIGHT: f64 = 0.4;
const RECENCY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubProfile {
    pub login: String,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub public_gists: u64,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Not part of the public REST payload; honoured when a proxy supplies it.
    #[serde(default)]
    pub contributions: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Whether `username` is shaped like a GitHub login and safe to put in a URL path.
pub fn is_valid_login(username: &str) -> bool {
    LOGIN_RE.is_match(username)
}

fn checked_login(username: &str) -> Result<&str, EngineError> {
    if is_valid_login(username) {
        Ok(username)
    } else {
        Err(EngineError::InvalidInput("Invalid GitHub username".into()))
    }
}

/// Read access to the parts of the GitHub REST API the engine needs.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn profile(&self, username: &str) -> Result<GitHubProfile, EngineError>;

    async fn repos(&self, username: &str) -> Result<Vec<GitHubRepo>, EngineError>;
}

/// REST client for `GET /users/{user}` and `GET /users/{user}/repos`.
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// GET `path`, mapping 404 to `Ok(None)`.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::RateLimited("GitHub API".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Upstream {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn profile(&self, username: &str) -> Result<GitHubProfile, EngineError> {
        let username = checked_login(username)?;
        self.get(&format!("/users/{username}"))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("GitHub user {username} not found")))
    }

    async fn repos(&self, username: &str) -> Result<Vec<GitHubRepo>, EngineError> {
        let username = checked_login(username)?;
        Ok(self
            .get(&format!("/users/{username}/repos?per_page=100&sort=updated"))
            .await?
            .unwrap_or_default())
    }
}

pub struct GitHubEngine {
    api: Arc<dyn GitHubApi>,
}

impl GitHubEngine {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl VerificationEngine for GitHubEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Github
    }

    async fn check(
        &self,
        claim: &Claim,
        ctx: &VerificationContext,
    ) -> Result<EngineOutcome, EngineError> {
        let username = ctx
            .github_username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EngineError::MissingInput("GitHub username not provided".into()))?;

        let profile = self.api.profile(username).await?;
        let repos = match self.api.repos(username).await {
            Ok(repos) => repos,
            Err(e) => {
                warn!(username, error = %e, "Failed to list GitHub repositories");
                Vec::new()
            }
        };

        let outcome = assess(&profile, &repos, &claim.text, Utc::now());
        info!(
            "GitHub verification for {}: {:.2}",
            username, outcome.score
        );
        Ok(outcome)
    }
}

/// Scores a profile and its repositories against a claimed skill.
pub fn assess(
    profile: &GitHubProfile,
    repos: &[GitHubRepo],
    skill: &str,
    now: DateTime<Utc>,
) -> EngineOutcome {
    let languages = language_counts(repos);
    let matching = matching_repo_count(&languages, skill);

    let activity = activity_score(profile);
    let recency = recency_score(profile.updated_at.as_deref(), now);
    let language = language_match_score(matching);
    let score = combined_score(activity, language, recency);

    debug!(
        activity,
        recency, language, matching, "GitHub component scores"
    );

    EngineOutcome::new(
        score,
        json!({
            "repositories": repos.len(),
            "languages": languages,
            "matching_repositories": matching,
            "activity_level": activity_level(activity),
            "last_activity": profile.updated_at,
            "followers": profile.followers,
            "public_repos": profile.public_repos,
            "activity_score": activity,
            "recency_score": recency,
            "language_match_score": language,
        }),
    )
}

pub fn activity_score(profile: &GitHubProfile) -> f64 {
    let mut score = (profile.public_repos as f64 / 50.0).min(0.3)
        + (profile.followers as f64 / 100.0).min(0.3)
        + (profile.public_gists as f64 / 50.0).min(0.2);
    if let Some(contributions) = profile.contributions {
        score += (contributions as f64 / 10_000.0).min(0.2);
    }
    score.min(1.0)
}

/// Tiered by whole days since `updated_at`; a missing or unparsable
/// timestamp scores 0.
pub fn recency_score(updated_at: Option<&str>, now: DateTime<Utc>) -> f64 {
    let Some(raw) = updated_at else {
        return 0.0;
    };
    let last_update = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!("Invalid GitHub timestamp '{}': {}", raw, e);
            return 0.0;
        }
    };

    match (now - last_update).num_days() {
        d if d <= 7 => 1.0,
        d if d <= 30 => 0.8,
        d if d <= 90 => 0.5,
        _ => 0.2,
    }
}

pub fn language_match_score(matching_repos: usize) -> f64 {
    (matching_repos as f64 / 10.0).min(1.0)
}

pub fn combined_score(activity: f64, language: f64, recency: f64) -> f64 {
    (ACTIVITY_WEIGHT * activity + LANGUAGE_WEIGHT * language + RECENCY_WEIGHT * recency)
        .clamp(0.0, 1.0)
}

fn activity_level(activity: f64) -> &'static str {
    if activity > 0.7 {
        "high"
    } else if activity > 0.4 {
        "medium"
    } else {
        "low"
    }
}

/// Repository count per primary language.
pub fn language_counts(repos: &[GitHubRepo]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for language in repos.iter().filter_map(|r| r.language.as_deref()) {
        *counts.entry(language.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Repo count of the language matching `skill`: an exact case-insensitive
/// match wins, otherwise the first language whose name contains the skill.
pub fn matching_repo_count(languages: &BTreeMap<String, usize>, skill: &str) -> usize {
    let skill = skill.trim().to_lowercase();
    if skill.is_empty() {
        return 0;
    }
    languages
        .iter()
        .find(|(lang, _)| lang.to_lowercase() == skill)
        .or_else(|| {
            languages
                .iter()
                .find(|(lang, _)| lang.to_lowercase().contains(&skill))
        })
        .map(|(_, count)| *count)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::claim::{ClaimKind, Span};
    use crate::test_support::StubServer;
    use chrono::Duration as ChronoDuration;

    fn ts(now: DateTime<Utc>, days_ago: i64) -> String {
        (now - ChronoDuration::days(days_ago)).to_rfc3339()
    }

    fn repo(name: &str, language: Option<&str>) -> GitHubRepo {
        GitHubRepo {
            name: name.to_string(),
            language: language.map(str::to_string),
            updated_at: None,
        }
    }

    #[test]
    fn test_recency_tiers() {
        let now = Utc::now();
        let cases = [(5, 1.0), (7, 1.0), (20, 0.8), (40, 0.5), (90, 0.5), (200, 0.2)];
        for (days, expected) in cases {
            let score = recency_score(Some(&ts(now, days)), now);
            assert_eq!(score, expected, "{days} days ago");
        }
    }

    #[test]
    fn test_recency_missing_or_invalid_is_zero() {
        let now = Utc::now();
        assert_eq!(recency_score(None, now), 0.0);
        assert_eq!(recency_score(Some("last tuesday"), now), 0.0);
    }

    #[test]
    fn test_activity_components_are_capped() {
        let profile = GitHubProfile {
            public_repos: 500,
            followers: 10_000,
            public_gists: 400,
            contributions: Some(50_000),
            ..Default::default()
        };
        assert!((activity_score(&profile) - 1.0).abs() < 1e-9);

        let quiet = GitHubProfile {
            public_repos: 5,
            ..Default::default()
        };
        assert!((activity_score(&quiet) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_exact_language_match_preferred() {
        let repos = vec![
            repo("a", Some("JavaScript")),
            repo("b", Some("Java")),
            repo("c", Some("Java")),
            repo("d", None),
        ];
        let langs = language_counts(&repos);
        assert_eq!(matching_repo_count(&langs, "java"), 2);
        assert_eq!(matching_repo_count(&langs, "script"), 1);
        assert_eq!(matching_repo_count(&langs, "Haskell"), 0);
    }

    #[test]
    fn test_language_score_caps_at_ten_repos() {
        assert_eq!(language_match_score(0), 0.0);
        assert!((language_match_score(4) - 0.4).abs() < 1e-9);
        assert_eq!(language_match_score(25), 1.0);
    }

    #[test]
    fn test_assess_combines_weights() {
        let now = Utc::now();
        let profile = GitHubProfile {
            login: "octocat".into(),
            public_repos: 50,
            followers: 100,
            public_gists: 50,
            updated_at: Some(ts(now, 3)),
            contributions: None,
        };
        let repos: Vec<GitHubRepo> = (0..5)
            .map(|i| repo(&format!("r{i}"), Some("Rust")))
            .chain([repo("py", Some("Python"))])
            .collect();

        let outcome = assess(&profile, &repos, "Rust", now);
        // 0.4 * 0.8 + 0.4 * 0.5 + 0.2 * 1.0
        assert!((outcome.score - 0.72).abs() < 1e-9);
        assert_eq!(outcome.evidence["matching_repositories"], 5);
        assert_eq!(outcome.evidence["activity_level"], "high");
        assert_eq!(outcome.evidence["repositories"], 6);
    }

    struct FakeGitHub {
        profile: Option<GitHubProfile>,
    }

    #[async_trait]
    impl GitHubApi for FakeGitHub {
        async fn profile(&self, username: &str) -> Result<GitHubProfile, EngineError> {
            self.profile
                .clone()
                .ok_or_else(|| EngineError::NotFound(format!("GitHub user {username} not found")))
        }

        async fn repos(&self, _username: &str) -> Result<Vec<GitHubRepo>, EngineError> {
            Err(EngineError::RateLimited("GitHub API".into()))
        }
    }

    fn skill_claim() -> Claim {
        Claim::new(
            ClaimKind::Skill,
            "Rust",
            0.9,
            Span { start: 0, end: 4 },
            "skills",
            Default::default(),
        )
    }

    #[test]
    fn test_login_grammar() {
        let longest = "x".repeat(39);
        let too_long = "x".repeat(40);
        for ok in ["octocat", "a", "jane-doe", "A1", longest.as_str()] {
            assert!(is_valid_login(ok), "{ok}");
        }
        for bad in ["", "-lead", "has space", "a/b", "../user/emails?x=", "é", too_long.as_str()] {
            assert!(!is_valid_login(bad), "{bad}");
        }
    }

    const PROFILE_JSON: &str = r#"{"login":"octocat","public_repos":12,"followers":3,"updated_at":"2024-01-02T03:04:05Z"}"#;

    #[tokio::test]
    async fn test_client_fetches_profile_with_token() {
        let server = StubServer::start(vec![(200, PROFILE_JSON.into())]).await;
        let client = GitHubClient::new(&server.base_url, Some("t0ken".into())).unwrap();

        let profile = client.profile("octocat").await.unwrap();
        assert_eq!(profile.login, "octocat");
        assert_eq!(profile.public_repos, 12);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].line, "GET /users/octocat");
        assert_eq!(requests[0].header("authorization"), Some("Bearer t0ken"));
        assert_eq!(requests[0].header("x-github-api-version"), Some(API_VERSION));
    }

    #[tokio::test]
    async fn test_client_lists_repos() {
        let body = r#"[{"name":"a","language":"Rust"},{"name":"b","language":null}]"#;
        let server = StubServer::start(vec![(200, body.into())]).await;
        let client = GitHubClient::new(&server.base_url, None).unwrap();

        let repos = client.repos("octocat").await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].language.as_deref(), Some("Rust"));
        let requests = server.requests();
        assert_eq!(
            requests[0].line,
            "GET /users/octocat/repos?per_page=100&sort=updated"
        );
        assert_eq!(requests[0].header("authorization"), None);
    }

    #[tokio::test]
    async fn test_client_maps_404_to_not_found() {
        let server = StubServer::start(vec![(404, r#"{"message":"Not Found"}"#.into())]).await;
        let client = GitHubClient::new(&server.base_url, None).unwrap();
        let err = client.profile("ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "GitHub user ghost not found");
    }

    #[tokio::test]
    async fn test_client_treats_empty_repo_404_as_no_repos() {
        let server = StubServer::start(vec![(404, "{}".into())]).await;
        let client = GitHubClient::new(&server.base_url, None).unwrap();
        assert!(client.repos("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_client_maps_403_and_429_to_rate_limited() {
        let server = StubServer::start(vec![
            (403, r#"{"message":"API rate limit exceeded"}"#.into()),
            (429, "{}".into()),
        ])
        .await;
        let client = GitHubClient::new(&server.base_url, None).unwrap();
        for _ in 0..2 {
            let err = client.profile("octocat").await.unwrap_err();
            assert!(matches!(err, EngineError::RateLimited(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_client_maps_server_error_to_upstream() {
        let server = StubServer::start(vec![(500, "boom".into())]).await;
        let client = GitHubClient::new(&server.base_url, None).unwrap();
        let err = client.profile("octocat").await.unwrap_err();
        match err {
            EngineError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected upstream error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_client_rejects_path_injection_before_sending() {
        let server = StubServer::start(vec![(200, PROFILE_JSON.into())]).await;
        let client = GitHubClient::new(&server.base_url, Some("t0ken".into())).unwrap();

        for username in ["../user/emails?x=", "octocat/../../user", "octo%2Fcat", "octocat#"] {
            let err = client.profile(username).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)), "{username}");
            let err = client.repos(username).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)), "{username}");
        }
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_username_is_an_error() {
        let engine = GitHubEngine::new(Arc::new(FakeGitHub { profile: None }));
        let err = engine
            .check(&skill_claim(), &VerificationContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "GitHub username not provided");
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let engine = GitHubEngine::new(Arc::new(FakeGitHub { profile: None }));
        let ctx = VerificationContext {
            github_username: Some("ghost".into()),
            ..Default::default()
        };
        let err = engine.check(&skill_claim(), &ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.to_string(), "GitHub user ghost not found");
    }

    #[tokio::test]
    async fn test_repo_listing_failure_still_scores_profile() {
        let profile = GitHubProfile {
            login: "octocat".into(),
            public_repos: 25,
            ..Default::default()
        };
        let engine = GitHubEngine::new(Arc::new(FakeGitHub {
            profile: Some(profile),
        }));
        let ctx = VerificationContext {
            github_username: Some("octocat".into()),
            ..Default::default()
        };
        let outcome = engine.check(&skill_claim(), &ctx).await.unwrap();
        // activity 0.3 only; no languages, no timestamp
        assert!((outcome.score - 0.12).abs() < 1e-9);
        assert_eq!(outcome.evidence["repositories"], 0);
    }
}
