//! Authenticated HTTP access to the bus-stop backend.
//!
//! Every request goes through [`ApiClient::execute`], which attaches the
//! bearer token, refreshes it ahead of expiry, and retries a request once
//! after a 401 caused by an expired or invalid token.

pub mod refresh;
pub mod tokens;

use std::sync::Arc;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::auth::{RefreshTokenRequest, TokenPair};
use crate::models::photo::UploadFile;
use refresh::RefreshGate;
use tokens::TokenStore;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Endpoints whose 401 means "bad credentials", never "refresh and retry".
const AUTH_EXEMPT_PATHS: [&str; 2] = ["/auth/login", "/auth/refresh"];

/// Endpoints that end the session themselves. A rejected session there clears
/// the tokens without announcing [`SessionEvent::Expired`].
const SESSION_ENDING_PATHS: [&str; 1] = ["/auth/logout"];

/// Notifications for whoever presents the session (the store, a UI shell).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Tokens were cleared because the session could not be kept alive.
    Expired,
}

/// Cheap to clone; clones share the connection pool, tokens and refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: String,
    http: Client,
    tokens: Arc<TokenStore>,
    gate: RefreshGate,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("tokens", &self.inner.tokens)
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_token_store(config, Arc::new(TokenStore::in_memory()))
    }

    pub fn with_token_store(config: &Config, tokens: Arc<TokenStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            inner: Arc::new(Inner {
                base_url: config.api_url.trim_end_matches('/').to_string(),
                http,
                tokens,
                gate: RefreshGate::new(),
                events,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Refresh calls actually sent to the backend since this client was built.
    pub fn refresh_count(&self) -> u64 {
        self.inner.gate.refresh_count()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    fn is_auth_exempt(path: &str) -> bool {
        let path = format!("/{}", path.trim_start_matches('/'));
        AUTH_EXEMPT_PATHS.iter().any(|p| path.starts_with(p))
    }

    fn ends_session(path: &str) -> bool {
        let path = format!("/{}", path.trim_start_matches('/'));
        SESSION_ENDING_PATHS.iter().any(|p| path.starts_with(p))
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Joins an in-flight refresh if there is one. On failure the tokens are
    /// cleared and the error is returned.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let observed = self.inner.tokens.generation();
        self.refresh_after(observed).await
    }

    async fn refresh_after(&self, observed: u64) -> Result<String> {
        self.inner
            .gate
            .refresh(&self.inner.tokens, observed, |refresh_token| {
                self.exchange_refresh_token(refresh_token)
            })
            .await
    }

    // Bypasses `execute` so the refresh itself is never intercepted.
    async fn exchange_refresh_token(&self, refresh_token: String) -> Result<String> {
        let response = self
            .inner
            .http
            .post(self.url("/auth/refresh"))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await?;
        let pair: TokenPair = Self::decode(Self::check(response).await?).await?;
        self.inner.tokens.save(&pair);
        info!("access token refreshed");
        Ok(pair.access_token)
    }

    /// Drop the session: clear tokens and tell subscribers.
    pub fn expire_session(&self) {
        self.inner.tokens.clear();
        // No subscribers is fine.
        let _ = self.inner.events.send(SessionEvent::Expired);
    }

    fn give_up_session(&self, path: &str) {
        if Self::ends_session(path) {
            self.inner.tokens.clear();
        } else {
            self.expire_session();
        }
    }

    /// Send one logical request built by `build`, handling auth around it.
    ///
    /// `build` is called again for the retry, so it must be repeatable.
    /// The same `X-Request-ID` is sent on both attempts.
    pub async fn execute<F>(&self, path: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client, &str) -> Result<RequestBuilder> + Send + Sync,
    {
        let url = self.url(path);
        let request_id = Uuid::new_v4().to_string();
        let exempt = Self::is_auth_exempt(path);

        let mut observed = self.inner.tokens.generation();
        let mut token = None;

        if !exempt {
            token = self.inner.tokens.access();
            if token.is_some() && self.inner.tokens.is_expired() && self.inner.tokens.refresh().is_some() {
                debug!("access token near expiry, refreshing before {path}");
                match self.refresh_after(observed).await {
                    Ok(fresh) => token = Some(fresh),
                    Err(_) => {
                        self.give_up_session(path);
                        return Err(ApiError::SessionExpired);
                    }
                }
                observed = self.inner.tokens.generation();
            }
        }

        let response = self.send(&build, &url, &request_id, token.as_deref()).await?;
        if exempt || response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        let error = Self::error_from(response).await;
        if error.is_token_error() && self.inner.tokens.refresh().is_some() {
            let fresh = match self.refresh_after(observed).await {
                Ok(fresh) => fresh,
                Err(_) => {
                    self.give_up_session(path);
                    return Err(ApiError::SessionExpired);
                }
            };
            debug!(request_id = %request_id, "retrying {path} with refreshed token");
            let retried = self.send(&build, &url, &request_id, Some(&fresh)).await?;
            return Self::check(retried).await;
        }

        warn!(request_id = %request_id, "unauthorized on {path}: {error}");
        self.give_up_session(path);
        Err(error)
    }

    async fn send<F>(&self, build: &F, url: &str, request_id: &str, token: Option<&str>) -> Result<Response>
    where
        F: Fn(&Client, &str) -> Result<RequestBuilder>,
    {
        let mut request = build(&self.inner.http, url)?.header(REQUEST_ID_HEADER, request_id);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let error = Self::error_from(response).await;
        warn!("API error: {error}");
        Err(error)
    }

    async fn error_from(response: Response) -> ApiError {
        let status = response.status();
        match response.text().await {
            Ok(body) => ApiError::from_body(status, &body),
            Err(e) => ApiError::Transport(e),
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(path, |http, url| Ok(http.get(url))).await?;
        Self::decode(response).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(path, |http, url| Ok(http.get(url).query(query)))
            .await?;
        Self::decode(response).await
    }

    /// Raw body of a download (report exports).
    pub async fn get_bytes<Q>(&self, path: &str, query: &Q) -> Result<Bytes>
    where
        Q: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(path, |http, url| Ok(http.get(url).query(query)))
            .await?;
        Ok(response.bytes().await?)
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(path, |http, url| Ok(http.post(url).json(body)))
            .await?;
        Self::decode(response).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(path, |http, url| Ok(http.post(url))).await?;
        Self::decode(response).await
    }

    /// POST whose arguments travel in the query string.
    pub async fn post_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(path, |http, url| Ok(http.post(url).query(query)))
            .await?;
        Self::decode(response).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(path, |http, url| Ok(http.put(url).json(body)))
            .await?;
        Self::decode(response).await
    }

    pub async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(path, |http, url| Ok(http.put(url))).await?;
        Self::decode(response).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(path, |http, url| Ok(http.patch(url).json(body)))
            .await?;
        Self::decode(response).await
    }

    /// DELETE; the response body, if any, is ignored.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(path, |http, url| Ok(http.delete(url))).await?;
        Ok(())
    }

    /// Multipart POST. The form is rebuilt for each attempt.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        files: &[(&str, &UploadFile)],
    ) -> Result<T> {
        let response = self
            .execute(path, |http, url| {
                let mut form = Form::new();
                for (field, file) in files {
                    let part = Part::bytes(file.bytes.clone())
                        .file_name(file.filename.clone())
                        .mime_str(&file.content_type)?;
                    form = form.part(field.to_string(), part);
                }
                Ok(http.post(url).query(query).multipart(form))
            })
            .await?;
        Self::decode(response).await
    }
}
