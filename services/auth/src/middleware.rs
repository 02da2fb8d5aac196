//! Middleware for access token authentication

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use common::{
    access::{ACCESS_TOKEN_COOKIE, access_token_from},
    error::AccountError,
    users::PublicUser,
};
use tracing::debug;

use crate::{AppState, error::ApiError};

/// The authenticated caller, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

/// Require a valid access token from the `accessToken` cookie or a
/// `Bearer` authorization header
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let jar = CookieJar::from_headers(req.headers());
    let cookie = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string());
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = access_token_from(cookie.as_deref(), header)
        .map(str::to_string)
        .ok_or_else(|| {
            debug!("Request without access token to {}", req.uri().path());
            AccountError::unauthorized("Unauthorized request")
        })?;

    let user = state.guard.authenticate(&token).await?;

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}
