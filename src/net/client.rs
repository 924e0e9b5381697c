//! HTTP client wrapper through which every GeoSiaga API call flows.
//!
//! SYSTEM CONTEXT
//! ==============
//! `ApiClient` owns the reqwest transport, the session storage handle, the
//! in-memory default credential, and the middleware [`Pipeline`]. Endpoint
//! helpers in `api` and the session context in `state::auth` only ever talk
//! to the backend through it.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures and non-2xx statuses propagate to the caller as
//! [`ApiError`] after response middleware ran. Nothing is retried.

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use super::api;
use super::middleware::{DefaultCredential, PendingRequest, Pipeline, ResponseInfo};
use super::types::ApiError;
use crate::config::ClientConfig;
use crate::util::csrf::CsrfSource;
use crate::util::storage::SessionStorage;

/// Performs the full-page navigation that follows an explicit logout.
pub trait Navigator: Send + Sync {
    fn redirect(&self, location: &str);
}

/// A completed 2xx exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    storage: SessionStorage,
    credential: DefaultCredential,
    pipeline: Pipeline,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("request_middleware", &self.inner.pipeline.request_names())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client with the standard middleware pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be constructed.
    pub fn new(
        config: ClientConfig,
        storage: SessionStorage,
        csrf: Option<Arc<dyn CsrfSource>>,
    ) -> Result<Self, ApiError> {
        let credential = DefaultCredential::default();
        let pipeline = Pipeline::standard(&storage, &credential, csrf);
        Self::with_pipeline(config, storage, credential, pipeline)
    }

    /// Client with a caller-assembled pipeline.
    ///
    /// `credential` should be the same handle the pipeline's middleware share,
    /// otherwise [`Self::set_default_token`] has no effect on requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be constructed.
    pub fn with_pipeline(
        config: ClientConfig,
        storage: SessionStorage,
        credential: DefaultCredential,
        pipeline: Pipeline,
    ) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeouts.request_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.timeouts.connect_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;
        Ok(Self { inner: Arc::new(Inner { http, config, storage, credential, pipeline }) })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.inner.storage
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Token attached when session storage holds none.
    pub fn set_default_token(&self, token: Option<String>) {
        self.inner.credential.set(token);
    }

    #[must_use]
    pub fn default_token(&self) -> Option<String> {
        self.inner.credential.get()
    }

    /// Build a request for `path` and run the request middleware over it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] for absolute URLs (credentials are only
    /// sent to the configured API), or the first middleware error.
    pub fn prepare(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<PendingRequest, ApiError> {
        if path.contains("://") {
            return Err(ApiError::InvalidUrl(path.to_owned()));
        }
        let mut request = PendingRequest::new(method, self.inner.config.endpoint(path));
        request.body = body;
        self.inner.pipeline.apply_request(&mut request)?;
        Ok(request)
    }

    /// Send a prepared request and run the response middleware.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when no response arrives and
    /// [`ApiError::Status`] for non-2xx responses.
    pub async fn execute(&self, request: PendingRequest) -> Result<ApiResponse, ApiError> {
        self.dispatch(request, true).await
    }

    async fn dispatch(&self, request: PendingRequest, observe: bool) -> Result<ApiResponse, ApiError> {
        let PendingRequest { method, url, headers, body } = request;
        let mut builder = self.inner.http.request(method.clone(), &url).headers(headers);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await.inspect_err(|err| {
            tracing::debug!(%method, url = %url, error = %err, "request failed before a response");
        })?;
        let status = response.status();
        if observe {
            self.inner.pipeline.apply_response(&ResponseInfo { method: &method, url: &url, status });
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::debug!(%method, url = %url, status = status.as_u16(), "request rejected");
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(ApiResponse { status, body })
    }

    /// Prepare and send in one step.
    ///
    /// # Errors
    ///
    /// See [`Self::prepare`] and [`Self::execute`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let request = self.prepare(method, path, body)?;
        self.execute(request).await
    }

    /// `GET` `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]; also fails if the body does not decode as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, None).await?.json()
    }

    /// `POST` `body` as JSON to `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]; also fails if either side does not (de)serialize.
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(body)).await?.json()
    }

    /// Notify the server of a logout on a detached task.
    ///
    /// Headers are resolved before the task is spawned, so the current token
    /// is sent even if local state is cleared right after. The task keeps
    /// running when the handle is dropped. Its outcome is only logged, and
    /// its response skips the middleware so a late 401 cannot wipe a newer
    /// session.
    pub fn spawn_logout_notification(&self) -> JoinHandle<()> {
        let prepared = api::logout_request(self);
        let client = self.clone();
        tokio::spawn(async move {
            let result = match prepared {
                Ok(request) => client.dispatch(request, false).await.map(|_| ()),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => tracing::debug!("server logout acknowledged"),
                Err(err) => tracing::warn!(error = %err, "server logout failed; local session cleared anyway"),
            }
        })
    }

    /// Where the logout helper sends the user: the login route on the API's origin.
    #[must_use]
    pub fn login_location(&self) -> String {
        let route = &self.inner.config.login_route;
        self.inner
            .config
            .base_url
            .join(route)
            .map_or_else(|_| route.clone(), |url| url.to_string())
    }

    /// Explicit user logout: best-effort server call, local cleanup, redirect.
    ///
    /// Must be called from within a Tokio runtime. The returned handle
    /// resolves when the server notification settles; awaiting it is optional.
    pub fn logout(&self, navigator: &dyn Navigator) -> JoinHandle<()> {
        let notification = self.spawn_logout_notification();
        self.inner.storage.clear_best_effort();
        self.inner.credential.set(None);
        let location = self.login_location();
        tracing::info!(location = %location, "logged out; redirecting to login");
        navigator.redirect(&location);
        notification
    }
}
