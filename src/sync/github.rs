//! GitHub sync: commits the store through the REST contents API.
//!
//! `GET` fetches the current blob SHA (404 means the file is new), then
//! `PUT` uploads the base64 content as a commit on the configured branch.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Env;
use crate::error::{ConfigError, SyncError};
use crate::store::StoreSnapshot;

use super::StoreSync;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Target repository and credentials.
#[derive(Debug, Clone)]
pub struct GithubSyncConfig {
    pub token: SecretString,
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
    pub api_base: String,
    pub commit_message: String,
    /// Path inside the repository; defaults to the store's file name.
    pub file_path: Option<String>,
}

impl GithubSyncConfig {
    /// `GH_TOKEN` and `GITHUB_REPO` are required.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let token = SecretString::from(env.required("GH_TOKEN")?);
        let repo = env.required("GITHUB_REPO")?;
        validate_repo(&repo)?;

        Ok(Self {
            token,
            repo,
            branch: env.or("GITHUB_BRANCH", "main"),
            api_base: env.or("GITHUB_API_URL", DEFAULT_API_BASE),
            commit_message: env.or(
                "GITHUB_COMMIT_MESSAGE",
                "chore: update lead store (lead sent)",
            ),
            file_path: env.optional("GITHUB_FILE_PATH"),
        })
    }
}

fn validate_repo(repo: &str) -> Result<(), ConfigError> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(ConfigError::InvalidValue {
            key: "GITHUB_REPO".to_string(),
            message: format!("expected owner/repo, got '{repo}'"),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

pub struct GithubSync {
    client: reqwest::Client,
    config: GithubSyncConfig,
}

impl GithubSync {
    pub fn new(config: GithubSyncConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn headers(&self) -> Result<HeaderMap, SyncError> {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static("drip-outreach"));
        h.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        h.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        let auth = format!("Bearer {}", self.config.token.expose_secret());
        h.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| SyncError::InvalidResponse(format!("invalid auth header: {e}")))?,
        );
        Ok(h)
    }

    fn contents_url(&self, file_path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.repo,
            file_path.trim_start_matches('/')
        )
    }

    async fn current_sha(&self, url: &str, headers: HeaderMap) -> Result<Option<String>, SyncError> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let entry: ContentsEntry = resp
                    .json()
                    .await
                    .map_err(|e| SyncError::InvalidResponse(format!("contents entry: {e}")))?;
                Ok(Some(entry.sha))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(SyncError::Status {
                operation: "GET contents".to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl StoreSync for GithubSync {
    fn name(&self) -> &str {
        "github"
    }

    #[instrument(level = "info", skip_all, fields(repo = %self.config.repo, branch = %self.config.branch))]
    async fn publish(&self, snapshot: &StoreSnapshot) -> Result<(), SyncError> {
        let file_path = self
            .config
            .file_path
            .clone()
            .unwrap_or_else(|| snapshot.file_name.clone());
        let url = self.contents_url(&file_path);
        let headers = self.headers()?;

        let sha = self.current_sha(&url, headers.clone()).await?;
        debug!(file = %file_path, sha = ?sha, "Fetched current SHA");

        let body = PutContents {
            message: &self.config.commit_message,
            content: BASE64.encode(&snapshot.content),
            branch: &self.config.branch,
            sha,
        };

        let resp = self.client.put(&url).headers(headers).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                operation: "PUT contents".to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        info!(file = %file_path, "Store published to GitHub");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GithubSyncConfig {
        GithubSyncConfig {
            token: SecretString::from("t"),
            repo: "me/jobs".into(),
            branch: "main".into(),
            api_base: "https://api.example.com/".into(),
            commit_message: "m".into(),
            file_path: None,
        }
    }

    #[test]
    fn repo_format_validated() {
        assert!(validate_repo("me/jobs").is_ok());
        assert!(validate_repo("jobs").is_err());
        assert!(validate_repo("/jobs").is_err());
        assert!(validate_repo("me/").is_err());
        assert!(validate_repo("me/jobs/extra").is_err());
    }

    #[test]
    fn contents_url_joins_cleanly() {
        let sync = GithubSync::new(config()).unwrap();
        assert_eq!(
            sync.contents_url("/data/leads.csv"),
            "https://api.example.com/repos/me/jobs/contents/data/leads.csv"
        );
    }

    #[test]
    fn headers_carry_token_and_version() {
        let sync = GithubSync::new(config()).unwrap();
        let h = sync.headers().unwrap();
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer t");
        assert_eq!(h.get("x-github-api-version").unwrap(), API_VERSION);
    }

    #[test]
    fn put_body_omits_missing_sha() {
        let body = PutContents {
            message: "m",
            content: BASE64.encode(b"a,b\n"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["content"], "YSxiCg==");
    }

    #[test]
    fn config_from_env_defaults() {
        let env = Env::from_pairs(&[("GH_TOKEN", "t"), ("GITHUB_REPO", "me/jobs")]);
        let cfg = GithubSyncConfig::from_env(&env).unwrap();
        assert_eq!(cfg.branch, "main");
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert!(cfg.file_path.is_none());
    }
}
