//! Authentication middleware for access token validation

use axum::{
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use common::{
    access::{ACCESS_TOKEN_COOKIE, access_token_from},
    error::AccountError,
    users::PublicUser,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

/// Caller of a route that also serves anonymous requests
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<Uuid>);

fn presented_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string());
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    access_token_from(cookie.as_deref(), header).map(str::to_string)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = presented_token(req.headers())
        .ok_or_else(|| AccountError::unauthorized("Unauthorized request"))?;

    let user = state.guard.authenticate(&token).await?;

    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

/// Like [`auth_middleware`], but a request without a token passes as an
/// anonymous [`Viewer`]. A token that is presented must still be valid.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = presented_token(req.headers());
    let viewer = match token {
        Some(token) => Some(state.guard.authenticate(&token).await?.id),
        None => None,
    };

    req.extensions_mut().insert(Viewer(viewer));
    Ok(next.run(req).await)
}
