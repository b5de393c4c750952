//! GitHub REST client
//!
//! Covers the two authorization flows (OAuth App and GitHub App user
//! authorization), installation and repository discovery, the pull request
//! endpoints used for ingestion, and the contents API used by the Codebase Age
//! sensor.

use std::fmt;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;

use crate::config::AppConfig;

const USER_AGENT: &str = "SignalKit";
const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const ERROR_BODY_LIMIT: usize = 200;

const OAUTH_SCOPES: &str = "repo read:org read:user user:email";
const APP_SCOPES: &str = "read:user user:email";

/// GitHub client errors
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("OAuth authentication failed: {0}")]
    OAuthError(String),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited by GitHub API. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Which GitHub credential pair a login uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AuthType {
    /// Classic OAuth App: broad `repo` scope, no installations
    #[default]
    #[serde(rename = "oauth")]
    OAuth,
    /// GitHub App user-to-server token scoped to the app's installations
    #[serde(rename = "app")]
    App,
}

impl AuthType {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuthType::OAuth => "oauth",
            AuthType::App => "app",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "oauth" => Some(AuthType::OAuth),
            "app" => Some(AuthType::App),
            _ => None,
        }
    }

    const fn scopes(self) -> &'static str {
        match self {
            AuthType::OAuth => OAUTH_SCOPES,
            AuthType::App => APP_SCOPES,
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Shared, cheaply clonable GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
    oauth: Option<OAuthCredentials>,
    app: Option<OAuthCredentials>,
}

impl GitHubClient {
    pub fn new(api_base: &str, oauth_base: &str) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            oauth_base: oauth_base.trim_end_matches('/').to_string(),
            oauth: None,
            app: None,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GitHubError> {
        let mut client = Self::new(&config.github_api_base, &config.github_oauth_base)?;
        if let (Some(id), Some(secret)) = (&config.github_client_id, &config.github_client_secret)
        {
            client = client.with_credentials(AuthType::OAuth, id, secret);
        }
        if let (Some(id), Some(secret)) = (
            &config.github_app_client_id,
            &config.github_app_client_secret,
        ) {
            client = client.with_credentials(AuthType::App, id, secret);
        }
        Ok(client)
    }

    pub fn with_credentials(mut self, auth_type: AuthType, client_id: &str, secret: &str) -> Self {
        let creds = Some(OAuthCredentials {
            client_id: client_id.to_string(),
            client_secret: secret.to_string(),
        });
        match auth_type {
            AuthType::OAuth => self.oauth = creds,
            AuthType::App => self.app = creds,
        }
        self
    }

    fn credentials(&self, auth_type: AuthType) -> Result<&OAuthCredentials, GitHubError> {
        let creds = match auth_type {
            AuthType::OAuth => self.oauth.as_ref(),
            AuthType::App => self.app.as_ref(),
        };
        creds.ok_or_else(|| {
            GitHubError::ConfigError(format!("no client credentials configured for {auth_type}"))
        })
    }

    /// Build the GitHub authorize URL for the chosen flow.
    pub fn authorize_url(
        &self,
        auth_type: AuthType,
        state: &str,
        redirect_uri: &str,
    ) -> Result<Url, GitHubError> {
        let creds = self.credentials(auth_type)?;
        let mut url = Url::parse(&format!("{}/login/oauth/authorize", self.oauth_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &creds.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", auth_type.scopes())
            .append_pair("state", state);
        debug!(%auth_type, "Built GitHub authorize URL");
        Ok(url)
    }

    /// Exchange an authorization code for a user access token.
    pub async fn exchange_code(
        &self,
        auth_type: AuthType,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, GitHubError> {
        let creds = self.credentials(auth_type)?;
        let params = [
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(format!("{}/login/oauth/access_token", self.oauth_base))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::OAuthError(format!(
                "Token exchange failed: {} - {}",
                status,
                truncate(&body)
            )));
        }

        // GitHub reports bad codes with a 200 and an `error` field
        let token: TokenExchangeResponse = serde_json::from_str(&response.text().await?)?;
        if let Some(error) = token.error {
            return Err(GitHubError::OAuthError(
                token.error_description.unwrap_or(error),
            ));
        }
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GitHubError::OAuthError("no access token in response".to_string()))
    }

    /// `GET /user`
    pub async fn get_user(&self, access_token: &str) -> Result<GitHubUser, GitHubError> {
        let url = self.api_url("/user")?;
        self.get_json(access_token, url).await
    }

    /// List the GitHub App installations visible to the user.
    ///
    /// OAuth App tokens cannot list installations; in that case the user's own
    /// account is returned as a single personal installation whose id is the
    /// user id.
    pub async fn list_installations(
        &self,
        access_token: &str,
    ) -> Result<Vec<Installation>, GitHubError> {
        let url = self.api_url("/user/installations")?;
        match self.get_json::<InstallationsPage>(access_token, url).await {
            Ok(page) => Ok(page.installations.into_iter().map(Into::into).collect()),
            Err(error) => {
                warn!(%error, "Failed to fetch installations, falling back to personal scope");
                let user = self.get_user(access_token).await?;
                Ok(vec![Installation {
                    id: user.id,
                    account: InstallationAccount {
                        login: user.login,
                        avatar_url: user.avatar_url,
                        account_type: "User".to_string(),
                    },
                }])
            }
        }
    }

    /// List repositories for an installation, falling back to the user's own
    /// repositories when the installation endpoint is unavailable.
    pub async fn list_installation_repositories(
        &self,
        access_token: &str,
        installation_id: i64,
    ) -> Result<Vec<RepositorySummary>, GitHubError> {
        let url = self.api_url(&format!(
            "/user/installations/{installation_id}/repositories"
        ))?;
        match self
            .get_json::<InstallationRepositoriesPage>(access_token, url)
            .await
        {
            Ok(page) => Ok(page.repositories),
            Err(error) => {
                warn!(%error, installation_id, "Failed to fetch installation repos, falling back to user repos");
                let mut url = self.api_url("/user/repos")?;
                url.query_pairs_mut()
                    .append_pair("sort", "updated")
                    .append_pair("per_page", "100")
                    .append_pair("affiliation", "owner,collaborator,organization_member");
                self.get_json(access_token, url).await
            }
        }
    }

    /// Most recently updated closed pull requests, merged or not.
    pub async fn list_closed_pull_requests(
        &self,
        access_token: &str,
        full_name: &str,
        limit: u32,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let mut url = self.api_url(&format!("/repos/{full_name}/pulls"))?;
        url.query_pairs_mut()
            .append_pair("state", "closed")
            .append_pair("sort", "updated")
            .append_pair("direction", "desc")
            .append_pair("per_page", &limit.to_string());
        self.get_json(access_token, url).await
    }

    pub async fn list_pull_request_files(
        &self,
        access_token: &str,
        full_name: &str,
        number: i64,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        let mut url = self.api_url(&format!("/repos/{full_name}/pulls/{number}/files"))?;
        url.query_pairs_mut().append_pair("per_page", "100");
        self.get_json(access_token, url).await
    }

    /// Fetch and decode a file from the default branch.
    ///
    /// Returns `Ok(None)` when the file is missing, the response is not a
    /// base64 file body, or GitHub answers with any non-2xx status. Only
    /// transport failures are errors.
    pub async fn get_file_contents(
        &self,
        access_token: &str,
        full_name: &str,
        path: &str,
    ) -> Result<Option<String>, GitHubError> {
        let url = self.api_url(&format!("/repos/{full_name}/contents/{path}"))?;
        let response = self.authed_get(access_token, url).send().await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), path, "Contents fetch returned no file");
            return Ok(None);
        }

        let Ok(file) = serde_json::from_str::<ContentFile>(&response.text().await?) else {
            return Ok(None);
        };
        Ok(file.decode())
    }

    fn api_url(&self, path: &str) -> Result<Url, GitHubError> {
        Ok(Url::parse(&format!("{}{}", self.api_base, path))?)
    }

    fn authed_get(&self, access_token: &str, url: Url) -> RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", ACCEPT_V3)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: Url,
    ) -> Result<T, GitHubError> {
        let path = url.path().to_string();
        let response = self.authed_get(access_token, url).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        info!(path = %path, bytes = body.len(), "GitHub request succeeded");
        Ok(serde_json::from_str(&body)?)
    }
}

async fn check_status(response: Response) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && header_value(&response, "X-RateLimit-Remaining") == Some(0));
    if rate_limited {
        let retry_after = header_value(&response, "Retry-After")
            .or_else(|| {
                header_value(&response, "X-RateLimit-Reset")
                    .map(|reset| reset.saturating_sub(Utc::now().timestamp().max(0) as u64))
            })
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        warn!(retry_after, "Rate limited by GitHub API");
        return Err(GitHubError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    Err(GitHubError::ApiError {
        status: status.as_u16(),
        message: truncate(&body),
    })
}

fn header_value(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn truncate(body: &str) -> String {
    if body.chars().count() > ERROR_BODY_LIMIT {
        let truncated: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

// GitHub API response types

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallationAccount {
    pub login: String,
    pub avatar_url: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
}

/// Installation as returned to API callers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Installation {
    pub id: i64,
    pub account: InstallationAccount,
}

#[derive(Debug, Deserialize)]
struct InstallationsPage {
    installations: Vec<RawInstallation>,
}

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: i64,
    account: RawAccount,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    login: String,
    avatar_url: Option<String>,
    #[serde(rename = "type")]
    account_type: String,
}

impl From<RawInstallation> for Installation {
    fn from(raw: RawInstallation) -> Self {
        Self {
            id: raw.id,
            account: InstallationAccount {
                login: raw.account.login,
                avatar_url: raw.account.avatar_url,
                account_type: raw.account.account_type,
            },
        }
    }
}

/// Repository metadata, deserialized from GitHub and re-serialized in camelCase.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySummary {
    pub id: i64,
    pub name: String,
    #[serde(alias = "full_name")]
    pub full_name: String,
    pub private: bool,
    #[serde(default, alias = "default_branch")]
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstallationRepositoriesPage {
    repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUserRef {
    pub login: String,
}

/// The subset of a pull request ingestion reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: i64,
    pub merged_at: Option<String>,
    pub user: Option<GitHubUserRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    content: Option<String>,
    encoding: Option<String>,
}

impl ContentFile {
    fn decode(self) -> Option<String> {
        if self.encoding.as_deref() != Some("base64") {
            return None;
        }
        // GitHub wraps the base64 body at 60 columns
        let compact: String = self
            .content?
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = general_purpose::STANDARD.decode(compact).ok()?;
        String::from_utf8(bytes).ok()
    }
}
