//! Wire DTOs for the GeoSiaga REST API and the errors raised at that boundary.
//!
//! DESIGN
//! ======
//! `User` mirrors the backend identity payload so the cached copy in session
//! storage round-trips through serde without loss. `UserPatch` is the
//! client-side partial update merged over that cache.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

use crate::util::storage::StorageError;

// =============================================================================
// USER PROFILE
// =============================================================================

/// An authenticated user as returned by `POST /login` and `GET /user`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend user identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Login email address.
    pub email: String,
    /// Role name assigned by the backend (e.g. `"admin"`, `"user"`).
    pub role: String,
    /// Contact phone number, if on file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Storage path of the profile photo, if uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo_path: Option<String>,
}

/// Partial profile fields applied on top of the cached [`User`].
///
/// Absent fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo_path: Option<String>,
}

impl UserPatch {
    /// True when the patch carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl User {
    /// Return a copy of this profile with every field present in `patch` replaced.
    #[must_use]
    pub fn merged(&self, patch: &UserPatch) -> Self {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name.clone_from(name);
        }
        if let Some(email) = &patch.email {
            next.email.clone_from(email);
        }
        if let Some(role) = &patch.role {
            next.role.clone_from(role);
        }
        if let Some(phone) = &patch.phone {
            next.phone = Some(phone.clone());
        }
        if let Some(path) = &patch.profile_photo_path {
            next.profile_photo_path = Some(path.clone());
        }
        next
    }
}

// =============================================================================
// LOGIN
// =============================================================================

/// Body of `POST /login`.
#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response of `POST /login`.
///
/// Both fields are optional on the wire; a usable login needs both.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl LoginResponse {
    /// Split into `(token, user)` when both are present and the token is non-empty.
    #[must_use]
    pub fn into_credentials(self) -> Option<(String, User)> {
        match (self.token, self.user) {
            (Some(token), Some(user)) if !token.is_empty() => Some((token, user)),
            _ => None,
        }
    }
}

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by [`crate::net::client::ApiClient`] requests.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (connect, TLS, timeout).
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned status {status}")]
    Status { status: u16, body: String },

    /// The response body was not the expected JSON shape.
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// A middleware produced a header value that is not valid on the wire.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The request path could not be joined onto the configured base URL.
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status carried by this error, if the server responded.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the server rejected the credential (401).
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Errors produced by [`crate::state::auth::AuthSession`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The login response lacked a token or a user.
    #[error("login response missing token or user")]
    IncompleteLogin,

    /// The operation needs an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session storage failed: {0}")]
    Storage(#[from] StorageError),
}
