//! Ordered request/response middleware applied by [`super::client::ApiClient`].
//!
//! SYSTEM CONTEXT
//! ==============
//! Credential injection, anti-forgery headers, and stale-token cleanup are
//! cross-cutting concerns of every API call. They live here as explicit
//! middleware so their order and side effects can be read and tested without
//! a network.
//!
//! ORDER
//! =====
//! Request side: `DefaultHeaders` → `BearerToken` → `CsrfHeader`, then any
//! caller-supplied middleware. Response side: `ClearSessionOnUnauthorized`,
//! then any caller-supplied middleware. Later middleware may overwrite
//! headers set earlier.

#[cfg(test)]
#[path = "middleware_test.rs"]
mod middleware_test;

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use super::types::ApiError;
use crate::util::csrf::CsrfSource;
use crate::util::storage::SessionStorage;

/// Header marking the request as coming from page script rather than navigation.
pub const REQUESTED_WITH: &str = "x-requested-with";
/// Header carrying the anti-forgery token.
pub const CSRF_HEADER: &str = "x-csrf-token";

// =============================================================================
// REQUEST / RESPONSE VIEWS
// =============================================================================

/// An outgoing request before it is handed to the transport.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl PendingRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: HeaderMap::new(), body: None }
    }
}

/// What response middleware gets to see of a completed exchange.
#[derive(Debug, Clone, Copy)]
pub struct ResponseInfo<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    pub status: StatusCode,
}

pub trait RequestMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mutate the request before it is sent.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the request before it reaches the network.
    fn on_request(&self, request: &mut PendingRequest) -> Result<(), ApiError>;
}

pub trait ResponseMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Observe a response. Runs for every status, success or not.
    fn on_response(&self, response: &ResponseInfo<'_>);
}

// =============================================================================
// DEFAULT CREDENTIAL
// =============================================================================

/// In-memory fallback bearer token shared by the client and its middleware.
#[derive(Debug, Clone, Default)]
pub struct DefaultCredential {
    token: Arc<RwLock<Option<String>>>,
}

impl DefaultCredential {
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.filter(|t| !t.is_empty());
    }
}

// =============================================================================
// BUILT-IN MIDDLEWARE
// =============================================================================

/// JSON content negotiation plus the AJAX-origin marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHeaders;

impl RequestMiddleware for DefaultHeaders {
    fn name(&self) -> &'static str {
        "default-headers"
    }

    fn on_request(&self, request: &mut PendingRequest) -> Result<(), ApiError> {
        let json = HeaderValue::from_static("application/json");
        request.headers.insert(ACCEPT, json.clone());
        request.headers.insert(CONTENT_TYPE, json);
        request.headers.insert(HeaderName::from_static(REQUESTED_WITH), HeaderValue::from_static("XMLHttpRequest"));
        Ok(())
    }
}

/// `Authorization: Bearer` from session storage, falling back to the default credential.
#[derive(Debug, Clone)]
pub struct BearerToken {
    storage: SessionStorage,
    fallback: DefaultCredential,
}

impl BearerToken {
    #[must_use]
    pub fn new(storage: SessionStorage, fallback: DefaultCredential) -> Self {
        Self { storage, fallback }
    }
}

impl RequestMiddleware for BearerToken {
    fn name(&self) -> &'static str {
        "bearer-token"
    }

    fn on_request(&self, request: &mut PendingRequest) -> Result<(), ApiError> {
        let Some(token) = self.storage.token().or_else(|| self.fallback.get()) else {
            return Ok(());
        };
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// `X-CSRF-TOKEN` from the page, read fresh for each request.
pub struct CsrfHeader {
    source: Arc<dyn CsrfSource>,
}

impl CsrfHeader {
    #[must_use]
    pub fn new(source: Arc<dyn CsrfSource>) -> Self {
        Self { source }
    }
}

impl RequestMiddleware for CsrfHeader {
    fn name(&self) -> &'static str {
        "csrf-header"
    }

    fn on_request(&self, request: &mut PendingRequest) -> Result<(), ApiError> {
        if let Some(token) = self.source.csrf_token() {
            request.headers.insert(HeaderName::from_static(CSRF_HEADER), HeaderValue::from_str(&token)?);
        }
        Ok(())
    }
}

/// Drops the stored session whenever any endpoint answers 401.
///
/// Only clears state; redirecting is left to the caller.
#[derive(Debug, Clone)]
pub struct ClearSessionOnUnauthorized {
    storage: SessionStorage,
    credential: DefaultCredential,
}

impl ClearSessionOnUnauthorized {
    #[must_use]
    pub fn new(storage: SessionStorage, credential: DefaultCredential) -> Self {
        Self { storage, credential }
    }
}

impl ResponseMiddleware for ClearSessionOnUnauthorized {
    fn name(&self) -> &'static str {
        "clear-session-on-401"
    }

    fn on_response(&self, response: &ResponseInfo<'_>) {
        if response.status != StatusCode::UNAUTHORIZED {
            return;
        }
        tracing::warn!(method = %response.method, url = response.url, "401 received; clearing stored session");
        self.storage.clear_best_effort();
        self.credential.set(None);
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// The ordered middleware lists of one client.
#[derive(Clone, Default)]
pub struct Pipeline {
    request: Vec<Arc<dyn RequestMiddleware>>,
    response: Vec<Arc<dyn ResponseMiddleware>>,
}

impl Pipeline {
    /// The built-in chain: headers, bearer token, CSRF, then 401 cleanup.
    #[must_use]
    pub fn standard(
        storage: &SessionStorage,
        credential: &DefaultCredential,
        csrf: Option<Arc<dyn CsrfSource>>,
    ) -> Self {
        let mut pipeline = Self::default();
        pipeline.push_request(Arc::new(DefaultHeaders));
        pipeline.push_request(Arc::new(BearerToken::new(storage.clone(), credential.clone())));
        if let Some(source) = csrf {
            pipeline.push_request(Arc::new(CsrfHeader::new(source)));
        }
        pipeline.push_response(Arc::new(ClearSessionOnUnauthorized::new(storage.clone(), credential.clone())));
        pipeline
    }

    pub fn push_request(&mut self, middleware: Arc<dyn RequestMiddleware>) {
        self.request.push(middleware);
    }

    pub fn push_response(&mut self, middleware: Arc<dyn ResponseMiddleware>) {
        self.response.push(middleware);
    }

    #[must_use]
    pub fn request_names(&self) -> Vec<&'static str> {
        self.request.iter().map(|m| m.name()).collect()
    }

    #[must_use]
    pub fn response_names(&self) -> Vec<&'static str> {
        self.response.iter().map(|m| m.name()).collect()
    }

    /// Run every request middleware in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first middleware error.
    pub fn apply_request(&self, request: &mut PendingRequest) -> Result<(), ApiError> {
        for middleware in &self.request {
            middleware.on_request(request)?;
        }
        Ok(())
    }

    pub fn apply_response(&self, response: &ResponseInfo<'_>) {
        for middleware in &self.response {
            middleware.on_response(response);
        }
    }
}
