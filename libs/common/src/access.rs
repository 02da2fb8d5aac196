//! Access token authentication shared by the HTTP middlewares

use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    error::{AccountError, AccountResult},
    token::{TokenCodec, TokenType},
    users::{PublicUser, UserStore},
};

/// Cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Cookie carrying the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Pick the access token from the cookie, else from a `Bearer` header
pub fn access_token_from<'a>(
    cookie: Option<&'a str>,
    authorization: Option<&'a str>,
) -> Option<&'a str> {
    cookie
        .filter(|token| !token.is_empty())
        .or_else(|| {
            authorization
                .and_then(|header| header.strip_prefix("Bearer "))
                .map(str::trim)
        })
        .filter(|token| !token.is_empty())
}

/// Resolves an access token to the user it was issued for
#[derive(Clone)]
pub struct AccessGuard {
    codec: TokenCodec,
    users: Arc<dyn UserStore>,
}

impl AccessGuard {
    pub fn new(codec: TokenCodec, users: Arc<dyn UserStore>) -> Self {
        Self { codec, users }
    }

    /// Verify `token` as an access token and load its user
    pub async fn authenticate(&self, token: &str) -> AccountResult<PublicUser> {
        let user_id = self
            .codec
            .verify(token, TokenType::Access)
            .map_err(|e| {
                debug!("Rejected access token: {}", e);
                AccountError::unauthorized("Invalid access token")
            })?;

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(|e| {
                error!("Failed to load user {}: {}", user_id, e);
                AccountError::internal()
            })?
            .ok_or_else(|| AccountError::unauthorized("Invalid access token"))?;

        Ok(user.to_public())
    }
}
