// HTTP client for the SwapGate backend, used by the client side of the
// session (login start, token refresh, authenticated MCP calls).

use std::time::Duration;

use serde_json::Value;

use super::storage::SessionStorage;
use super::store::{OAuthSession, SessionStore, TokenRefresher};
use super::SessionError;
use crate::models::{AuthorizeRequest, AuthorizeResponse, McpCallBody, McpCallResult, RefreshRequest, TokenPair};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turns a non-2xx response into `SessionError::Backend`, using the
    /// `error` field of the JSON body when there is one.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SessionError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(SessionError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn authorize(
        &self,
        module: &str,
        provider: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<AuthorizeResponse, SessionError> {
        let body = AuthorizeRequest {
            module: Some(module.to_string()),
            provider: provider.map(str::to_string),
            redirect_uri: redirect_uri.map(str::to_string),
        };
        let resp = self
            .http
            .post(self.url("/api/oauth/authorize"))
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Marks the session as authenticating and returns the provider URL to
    /// send the user to. A failure is recorded on the session.
    pub async fn start_login<S, R>(
        &self,
        store: &SessionStore<S, R>,
        module: &str,
        provider: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<String, SessionError>
    where
        S: SessionStorage,
        R: TokenRefresher,
    {
        store.begin_login(module);
        match self.authorize(module, provider, redirect_uri).await {
            Ok(resp) => Ok(resp.auth_url),
            Err(e) => {
                store.fail_login(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let resp = self
            .http
            .post(self.url("/api/oauth/refresh"))
            .json(&RefreshRequest {
                refresh_token: Some(refresh_token.to_string()),
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Calls an MCP service as the session's user. `module` defaults to the
    /// session's current module.
    pub async fn call_mcp(
        &self,
        session: &OAuthSession,
        service: &str,
        method: &str,
        params: Value,
        module: Option<&str>,
    ) -> Result<McpCallResult, SessionError> {
        if !session.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        let token = session.access_token().ok_or(SessionError::NotAuthenticated)?;

        let body = McpCallBody {
            service: Some(service.to_string()),
            method: Some(method.to_string()),
            params,
            module: module.map(str::to_string).or_else(|| session.current_module.clone()),
        };
        let resp = self
            .http
            .post(self.url("/api/mcp/call"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

impl TokenRefresher for BackendClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        self.refresh_tokens(refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_mcp_refuses_anonymous_session() {
        let client = BackendClient::new("http://127.0.0.1:9");
        let err = client
            .call_mcp(&OAuthSession::default(), "swap", "getTokens", Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = BackendClient::new("http://localhost:8081/");
        assert_eq!(client.url("/api/health"), "http://localhost:8081/api/health");
    }
}
