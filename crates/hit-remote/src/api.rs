use std::env;
use std::time::Duration;

use hit_core::{Commit, ObjectHash};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::session;

const DEFAULT_API_URL: &str = "https://api.hit-scm.dev";
const DEFAULT_WEB_URL: &str = "https://hit-scm.dev";
const DEFAULT_MEDIA_URL: &str = "https://media.hit-scm.dev/hit";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote API request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("remote API returned an error: {0}")]
    Api(String),
    #[error("not logged in; run `hit login` first")]
    NotLoggedIn,
}

pub fn api_url() -> String {
    env::var("HIT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

pub fn web_url() -> String {
    env::var("HIT_WEB_URL").unwrap_or_else(|_| DEFAULT_WEB_URL.to_string())
}

pub fn media_url() -> String {
    env::var("HIT_MEDIA_URL").unwrap_or_else(|_| DEFAULT_MEDIA_URL.to_string())
}

/// Every API response arrives wrapped in a success/message/data envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPayload {
    pub name: String,
    #[serde(default)]
    pub head_commit: ObjectHash,
    #[serde(default)]
    pub commits: Vec<Commit>,
}

/// Repository snapshot served for clone and fetch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonePayload {
    #[serde(default)]
    pub branches: Vec<BranchPayload>,
    #[serde(default)]
    pub hashes: Vec<String>,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadCommitPayload {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub head_commit: Option<HeadCommitInfo>,
}

#[derive(Debug, Deserialize)]
pub struct HeadCommitInfo {
    pub hash: ObjectHash,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUploadPayload {
    #[serde(default)]
    pub signed_url: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionCheck {
    pub valid: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
}

/// Blocking client for the hit server. Authenticated endpoints carry the
/// session token as `Authorization: Terminal <token>`.
pub struct ApiClient {
    http: Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            token,
        }
    }

    /// Client with the token from `~/.hit_session`, if any.
    pub fn from_session() -> anyhow::Result<Self> {
        let token = session::load()?.map(|s| s.token);
        Ok(Self::new(token))
    }

    fn token(&self) -> anyhow::Result<&str> {
        self.token.as_deref().ok_or_else(|| RemoteError::NotLoggedIn.into())
    }

    pub fn create_session(&self) -> anyhow::Result<CreatedSession> {
        let url = format!("{}/api/v1/auth/session", api_url());
        let resp = self.http.post(url).send()?;
        let data: CreatedSession = unwrap_envelope(check(resp)?)?;
        if data.token.is_empty() {
            return Err(RemoteError::Api("empty session token".into()).into());
        }
        Ok(data)
    }

    pub fn check_session(&self, session_id: &str) -> anyhow::Result<SessionCheck> {
        let url = format!("{}/api/v1/auth/session/{session_id}", api_url());
        let resp = self.http.get(url).send()?;
        unwrap_envelope(check(resp)?)
    }

    pub fn clone_payload(&self, remote: &str) -> anyhow::Result<ClonePayload> {
        let url = format!("{}/api/v1/repo/clone", api_url());
        let resp = self
            .http
            .post(url)
            .query(&[("remote", remote)])
            .header("Authorization", format!("Terminal {}", self.token()?))
            .json(&serde_json::json!({ "remote": remote }))
            .send()?;
        unwrap_envelope(check(resp)?)
    }

    /// (exists, hash) of the branch head on the server.
    pub fn head_commit(&self, remote: &str, branch: &str) -> anyhow::Result<(bool, ObjectHash)> {
        let url = format!("{}/api/v1/branch/{branch}/head-commit", api_url());
        let resp = self
            .http
            .get(url)
            .query(&[("remote", remote)])
            .header("Authorization", format!("Terminal {}", self.token()?))
            .send()?;
        let payload: HeadCommitPayload = unwrap_envelope(check(resp)?)?;
        let hash = payload
            .head_commit
            .map(|info| info.hash)
            .unwrap_or(ObjectHash::ZERO);
        Ok((payload.exists, hash))
    }

    pub fn create_commits(
        &self,
        remote: &str,
        branch: &str,
        commits: &[Commit],
    ) -> anyhow::Result<()> {
        let url = format!("{}/api/v1/branch/{branch}/commits", api_url());
        let resp = self
            .http
            .post(url)
            .query(&[("remote", remote)])
            .header("Authorization", format!("Terminal {}", self.token()?))
            .json(&serde_json::json!({ "commits": commits }))
            .send()?;
        check(resp)?;
        Ok(())
    }

    pub fn signed_upload_url(
        &self,
        remote: &str,
        hash: &ObjectHash,
    ) -> anyhow::Result<SignedUploadPayload> {
        let url = format!("{}/api/v1/repo/signed-url/{hash}", api_url());
        let resp = self
            .http
            .get(url)
            .query(&[("remote", remote)])
            .header("Authorization", format!("Terminal {}", self.token()?))
            .send()?;
        unwrap_envelope(check(resp)?)
    }

    pub fn put_signed(&self, signed_url: &str, body: Vec<u8>) -> anyhow::Result<()> {
        let resp = self.http.put(signed_url).body(body).send()?;
        check(resp)?;
        Ok(())
    }

    pub fn confirm_upload(&self, remote: &str, hash: &ObjectHash) -> anyhow::Result<()> {
        let url = format!("{}/api/v1/repo/signed-url/{hash}/confirm", api_url());
        let resp = self
            .http
            .post(url)
            .query(&[("remote", remote)])
            .header("Authorization", format!("Terminal {}", self.token()?))
            .send()?;
        check(resp)?;
        Ok(())
    }

    /// Fetch an object's zlib-compressed bytes from the media host.
    pub fn download_object(&self, hash: &ObjectHash) -> anyhow::Result<Vec<u8>> {
        let hex = hash.to_hex();
        let url = format!("{}/{}/{}", media_url(), &hex[..2], &hex[2..]);
        debug!(hash = %hash, "downloading object");
        let resp = self.http.get(url).send()?;
        let resp = check(resp)?;
        Ok(resp.bytes()?.to_vec())
    }
}

pub fn login_poll_interval() -> Duration {
    Duration::from_secs(3)
}

pub fn login_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn check(resp: Response) -> anyhow::Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(RemoteError::Http {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    Ok(resp)
}

fn unwrap_envelope<T: DeserializeOwned>(resp: Response) -> anyhow::Result<T> {
    let envelope: Envelope<T> = resp.json()?;
    if !envelope.success {
        return Err(RemoteError::Api(envelope.message).into());
    }
    envelope
        .data
        .ok_or_else(|| RemoteError::Api("response envelope carried no data".into()).into())
}
