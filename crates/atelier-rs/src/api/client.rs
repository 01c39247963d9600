//! Async HTTP client for the Atelier JSON API.
//!
//! A thin typed wrapper: one method per consumed endpoint, request/response
//! logging at `debug!`, and every failure mapped into the [`ApiError`]
//! taxonomy before callers see it. HTTP 401 always becomes
//! [`ApiError::AuthExpired`] so the session manager can handle credential
//! rejection uniformly.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::debug;

use crate::api::error::ApiError;
use crate::config::ClientConfig;
use crate::types::{
    AiAgent, AuthResponse, AuthToken, Creation, CreationFilter, FeedItem, NewCreation, Page,
    ProfileUpdate, User,
};

/// Error body shape the service uses for non-2xx responses. Either field may
/// be present; raw text is the last resort.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Extract a displayable message from a non-success response body.
fn extract_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed
            .message
            .or(parsed.error)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

/// Typed client for every Atelier endpoint the sync layer consumes.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from configuration (user agent, request timeout).
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("atelier-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Convenience constructor with a default configuration for a base URL.
    pub fn for_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::new(&ClientConfig::new(base_url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn bearer(
        &self,
        builder: reqwest::RequestBuilder,
        token: &AuthToken,
    ) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", token.as_str()))
    }

    /// Send a request and deserialize a JSON body, mapping failures into the
    /// error taxonomy.
    async fn execute<T: DeserializeOwned>(
        &self,
        label: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let text = self.execute_raw(label, builder).await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::Network(format!("failed to parse {label} response: {e}")))
    }

    /// Send a request where the response body is irrelevant (2xx is enough).
    async fn execute_empty(
        &self,
        label: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<(), ApiError> {
        self.execute_raw(label, builder).await.map(|_| ())
    }

    async fn execute_raw(
        &self,
        label: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<String, ApiError> {
        let start = Instant::now();
        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read response: {e}")))?;

        debug!(
            "{label}: HTTP {status} in {:.2}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if status.as_u16() == 401 {
            return Err(ApiError::AuthExpired);
        }
        if !status.is_success() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: extract_message(&text),
            });
        }
        Ok(text)
    }

    fn page_params(offset: u64, limit: u64) -> Vec<(&'static str, String)> {
        vec![("offset", offset.to_string()), ("limit", limit.to_string())]
    }

    // ── Authentication ─────────────────────────────────────────────

    /// Exchange credentials for a token and user record.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.execute(
            "login",
            self.client.post(self.url("/auth/login")).json(&body),
        )
        .await
    }

    /// Create an account and log in.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = serde_json::json!({ "name": name, "email": email, "password": password });
        self.execute(
            "signup",
            self.client.post(self.url("/auth/signup")).json(&body),
        )
        .await
    }

    /// Identity check: resolve the current token to a fresh user record.
    pub async fn me(&self, token: &AuthToken) -> Result<User, ApiError> {
        self.execute("me", self.bearer(self.client.get(self.url("/auth/me")), token))
            .await
    }

    /// Invalidate a token server-side. Callers treat this as best-effort.
    pub async fn logout(&self, token: &AuthToken) -> Result<(), ApiError> {
        self.execute_empty(
            "logout",
            self.bearer(self.client.post(self.url("/auth/logout")), token),
        )
        .await
    }

    /// Apply a partial profile update, returning the confirmed user record.
    pub async fn update_profile(
        &self,
        token: &AuthToken,
        update: &ProfileUpdate,
    ) -> Result<User, ApiError> {
        self.execute(
            "update_profile",
            self.bearer(self.client.patch(self.url("/auth/profile")), token)
                .json(update),
        )
        .await
    }

    // ── Agents ─────────────────────────────────────────────────────

    pub async fn list_agents(&self, offset: u64, limit: u64) -> Result<Page<AiAgent>, ApiError> {
        self.execute(
            "list_agents",
            self.client
                .get(self.url("/agents"))
                .query(&Self::page_params(offset, limit)),
        )
        .await
    }

    pub async fn get_agent(&self, id: &str) -> Result<AiAgent, ApiError> {
        self.execute("get_agent", self.client.get(self.url(&format!("/agents/{id}"))))
            .await
    }

    pub async fn agent_creations(
        &self,
        id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Page<Creation>, ApiError> {
        self.execute(
            "agent_creations",
            self.client
                .get(self.url(&format!("/agents/{id}/creations")))
                .query(&Self::page_params(offset, limit)),
        )
        .await
    }

    // ── Creations ──────────────────────────────────────────────────

    /// List creations with optional agent/search/style filters and an
    /// offset/limit window.
    pub async fn list_creations(
        &self,
        filter: &CreationFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Page<Creation>, ApiError> {
        let mut params = Self::page_params(offset, limit);
        if let Some(agent_id) = &filter.agent_id {
            params.push(("agent", agent_id.clone()));
        }
        if let Some(search) = &filter.search {
            params.push(("search", search.clone()));
        }
        if let Some(style) = &filter.style {
            params.push(("style", style.clone()));
        }
        self.execute(
            "list_creations",
            self.client.get(self.url("/creations")).query(&params),
        )
        .await
    }

    pub async fn get_creation(&self, id: &str) -> Result<Creation, ApiError> {
        self.execute(
            "get_creation",
            self.client.get(self.url(&format!("/creations/{id}"))),
        )
        .await
    }

    pub async fn like_creation(&self, token: &AuthToken, id: &str) -> Result<(), ApiError> {
        self.execute_empty(
            "like_creation",
            self.bearer(
                self.client.post(self.url(&format!("/creations/{id}/like"))),
                token,
            ),
        )
        .await
    }

    pub async fn unlike_creation(&self, token: &AuthToken, id: &str) -> Result<(), ApiError> {
        self.execute_empty(
            "unlike_creation",
            self.bearer(
                self.client
                    .delete(self.url(&format!("/creations/{id}/like"))),
                token,
            ),
        )
        .await
    }

    pub async fn save_creation(&self, token: &AuthToken, id: &str) -> Result<(), ApiError> {
        self.execute_empty(
            "save_creation",
            self.bearer(
                self.client.post(self.url(&format!("/creations/{id}/save"))),
                token,
            ),
        )
        .await
    }

    pub async fn unsave_creation(&self, token: &AuthToken, id: &str) -> Result<(), ApiError> {
        self.execute_empty(
            "unsave_creation",
            self.bearer(
                self.client
                    .delete(self.url(&format!("/creations/{id}/save"))),
                token,
            ),
        )
        .await
    }

    /// Create a brand-new root creation.
    pub async fn create_creation(
        &self,
        token: &AuthToken,
        req: &NewCreation,
    ) -> Result<Creation, ApiError> {
        self.execute(
            "create_creation",
            self.bearer(self.client.post(self.url("/creations")), token)
                .json(req),
        )
        .await
    }

    /// Evolve an existing creation into a new child in its lineage.
    pub async fn evolve_creation(
        &self,
        token: &AuthToken,
        parent_id: &str,
    ) -> Result<Creation, ApiError> {
        self.execute(
            "evolve_creation",
            self.bearer(
                self.client
                    .post(self.url(&format!("/creations/{parent_id}/evolve"))),
                token,
            ),
        )
        .await
    }

    // ── Feed ───────────────────────────────────────────────────────

    pub async fn feed(&self, offset: u64, limit: u64) -> Result<Page<FeedItem>, ApiError> {
        self.execute(
            "feed",
            self.client
                .get(self.url("/feed"))
                .query(&Self::page_params(offset, limit)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_message_prefers_message_field() {
        let body = r#"{"message": "invalid credentials"}"#;
        assert_eq!(extract_message(body), "invalid credentials");
    }

    #[test]
    fn extract_message_falls_back_to_error_field() {
        let body = r#"{"error": "rate limited"}"#;
        assert_eq!(extract_message(body), "rate limited");
    }

    #[test]
    fn extract_message_raw_text_last_resort() {
        assert_eq!(extract_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn base_url_trailing_slash_normalized() {
        let client = ApiClient::for_base_url("https://api.example.com/v1/").unwrap();
        assert_eq!(client.url("/agents"), "https://api.example.com/v1/agents");
    }
}
