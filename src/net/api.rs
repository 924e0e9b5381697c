//! REST endpoint helpers for the GeoSiaga auth API.
//!
//! Each helper goes through [`ApiClient`], so the standard headers and the
//! 401 cleanup apply to all of them.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use reqwest::Method;

use super::client::ApiClient;
use super::middleware::PendingRequest;
use super::types::{ApiError, LoginRequest, LoginResponse, User};

pub const LOGIN_PATH: &str = "/login";
pub const LOGOUT_PATH: &str = "/logout";
pub const CURRENT_USER_PATH: &str = "/user";

/// Exchange credentials via `POST /login`.
///
/// # Errors
///
/// Returns an error if the request fails, the server rejects the credentials,
/// or the body is not a login response.
pub async fn login(client: &ApiClient, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
    client.post_json(LOGIN_PATH, &LoginRequest { email, password }).await
}

/// The prepared `POST /logout` request, headers already resolved.
///
/// # Errors
///
/// Returns the first request middleware error.
pub fn logout_request(client: &ApiClient) -> Result<PendingRequest, ApiError> {
    client.prepare(Method::POST, LOGOUT_PATH, None)
}

/// Tell the server the session is over via `POST /logout`.
///
/// # Errors
///
/// Returns an error if the request fails or the server rejects it.
pub async fn logout(client: &ApiClient) -> Result<(), ApiError> {
    let request = logout_request(client)?;
    client.execute(request).await.map(|_| ())
}

/// Fetch the authenticated user from `GET /user`.
///
/// # Errors
///
/// Returns an error if the request fails, the session is rejected, or the
/// body is not a user profile.
pub async fn fetch_current_user(client: &ApiClient) -> Result<User, ApiError> {
    client.get_json(CURRENT_USER_PATH).await
}
