//! Token issuance and rotation
//!
//! A user is anonymous until `login` stores a refresh token in their single
//! session slot. `refresh` exchanges that exact token for a new pair and
//! swaps the slot atomically, so each refresh token works once. `logout`
//! empties the slot. Logging in again overwrites the slot, which silently
//! ends any other session's ability to refresh.

use std::sync::Arc;

use common::{
    error::{AccountError, AccountResult, StoreError},
    password::PasswordHasher,
    session::SessionStore,
    token::{TokenCodec, TokenError, TokenType},
    upload::{MediaUploader, StagedFile},
    users::{NewUser, PublicUser, UserStore},
    validation::{require_fields, validate_email, validate_username},
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Freshly issued credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: PublicUser,
}

/// Text fields of a registration
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Login by username or email
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Login, refresh, logout, registration and password changes
#[derive(Clone)]
pub struct AuthService {
    codec: TokenCodec,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    hasher: Arc<dyn PasswordHasher>,
    uploader: Arc<dyn MediaUploader>,
}

fn store_failure(context: &'static str) -> impl FnOnce(StoreError) -> AccountError {
    move |e| {
        error!("{}: {}", context, e);
        AccountError::internal()
    }
}

fn token_failure(e: TokenError) -> AccountError {
    error!("Failed to issue tokens: {}", e);
    AccountError::Internal("Something went wrong while generating tokens".to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl AuthService {
    /// `codec` is built from the token configuration by the caller
    pub fn new(
        codec: TokenCodec,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: Arc<dyn PasswordHasher>,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        Self {
            codec,
            users,
            sessions,
            hasher,
            uploader,
        }
    }

    fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.codec.issue_access_token(user_id)?,
            refresh_token: self.codec.issue_refresh_token(user_id)?,
        })
    }

    async fn upload(&self, file: &StagedFile, what: &str) -> AccountResult<String> {
        self.uploader
            .upload(file.path())
            .await
            .map(|media| media.url)
            .map_err(|e| {
                warn!("Failed to upload {}: {}", what, e);
                AccountError::bad_request(format!("Failed to upload {}", what))
            })
    }

    /// Create an identity. Nothing is stored unless every upload succeeded.
    pub async fn register(
        &self,
        registration: Registration,
        avatar: Option<StagedFile>,
        cover_image: Option<StagedFile>,
    ) -> AccountResult<PublicUser> {
        require_fields(&[
            registration.full_name.as_str(),
            registration.email.as_str(),
            registration.username.as_str(),
            registration.password.as_str(),
        ])?;

        let username = registration.username.trim().to_lowercase();
        let email = registration.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;

        let existing = self
            .users
            .find_by_identifier(Some(&username), Some(&email))
            .await
            .map_err(store_failure("Failed to check for existing user"))?;
        if existing.is_some() {
            return Err(AccountError::conflict("Username or email already exists"));
        }

        let avatar = avatar.ok_or_else(|| AccountError::bad_request("Avatar file is required"))?;
        let avatar_url = self.upload(&avatar, "avatar").await?;
        let cover_image_url = match &cover_image {
            Some(file) => self.upload(file, "cover image").await?,
            None => String::new(),
        };

        let password_hash = self.hasher.hash(&registration.password).map_err(|e| {
            error!("Failed to hash password: {}", e);
            AccountError::internal()
        })?;

        let user = self
            .users
            .create(NewUser {
                username,
                email,
                full_name: registration.full_name.trim().to_string(),
                avatar: avatar_url,
                cover_image: cover_image_url,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    AccountError::conflict("Username or email already exists")
                }
                other => store_failure("Failed to create user")(other),
            })?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user.to_public())
    }

    /// Verify credentials, issue a pair and store the refresh token
    pub async fn login(&self, credentials: Credentials) -> AccountResult<LoginOutcome> {
        let username = non_blank(credentials.username.as_deref());
        let email = non_blank(credentials.email.as_deref());
        if username.is_none() && email.is_none() {
            return Err(AccountError::bad_request("Username or email is required"));
        }
        if credentials.password.is_empty() {
            return Err(AccountError::bad_request("Password is required"));
        }

        let user = self
            .users
            .find_by_identifier(username, email)
            .await
            .map_err(store_failure("Failed to look up user"))?
            .ok_or_else(|| AccountError::not_found("User does not exist"))?;

        let password_valid = self
            .hasher
            .verify(&credentials.password, &user.password_hash)
            .map_err(|e| {
                error!("Failed to verify password for user {}: {}", user.id, e);
                AccountError::internal()
            })?;
        if !password_valid {
            return Err(AccountError::unauthorized("Invalid user credentials"));
        }

        let tokens = self.issue_pair(user.id).map_err(token_failure)?;
        self.sessions
            .replace(user.id, &tokens.refresh_token)
            .await
            .map_err(|e| {
                error!("Failed to store session for user {}: {}", user.id, e);
                AccountError::Internal("Something went wrong while generating tokens".to_string())
            })?;

        info!("User {} logged in", user.id);
        Ok(LoginOutcome {
            tokens,
            user: user.to_public(),
        })
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Every failure, including storage trouble, surfaces as `Unauthorized`.
    pub async fn refresh(&self, presented: Option<&str>) -> AccountResult<TokenPair> {
        let presented = presented
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AccountError::unauthorized("Unauthorized request"))?;

        let user_id = self
            .codec
            .verify(presented, TokenType::Refresh)
            .map_err(|e| {
                warn!("Rejected refresh token: {}", e);
                AccountError::unauthorized("Invalid refresh token")
            })?;

        let reused = || AccountError::unauthorized("Refresh token is expired or used");
        let unavailable = |context: &'static str| {
            move |e: StoreError| {
                error!("{} for user {}: {}", context, user_id, e);
                AccountError::unauthorized("Invalid refresh token")
            }
        };

        self.users
            .find_by_id(user_id)
            .await
            .map_err(unavailable("Failed to load user"))?
            .ok_or_else(|| AccountError::unauthorized("Invalid refresh token"))?;

        let stored = self
            .sessions
            .current(user_id)
            .await
            .map_err(unavailable("Failed to read session"))?;
        if stored.as_deref() != Some(presented) {
            warn!("Superseded refresh token presented for user {}", user_id);
            return Err(reused());
        }

        let tokens = self.issue_pair(user_id).map_err(|e| {
            error!("Failed to issue tokens for user {}: {}", user_id, e);
            AccountError::unauthorized("Invalid refresh token")
        })?;

        let swapped = self
            .sessions
            .compare_and_swap(user_id, presented, &tokens.refresh_token)
            .await
            .map_err(unavailable("Failed to rotate session"))?;
        if !swapped {
            warn!("Lost refresh race for user {}", user_id);
            return Err(reused());
        }

        info!("Rotated refresh token for user {}", user_id);
        Ok(tokens)
    }

    /// Clear the stored refresh token. Idempotent.
    pub async fn logout(&self, user_id: Uuid) -> AccountResult<()> {
        self.sessions
            .clear(user_id)
            .await
            .map_err(store_failure("Failed to clear session"))?;

        info!("User {} logged out", user_id);
        Ok(())
    }

    /// Replace the password hash; the stored session is left as is
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AccountResult<()> {
        require_fields(&[old_password, new_password])?;

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(store_failure("Failed to load user"))?
            .ok_or_else(|| AccountError::not_found("User does not exist"))?;

        let old_valid = self
            .hasher
            .verify(old_password, &user.password_hash)
            .map_err(|e| {
                error!("Failed to verify password for user {}: {}", user.id, e);
                AccountError::internal()
            })?;
        if !old_valid {
            return Err(AccountError::unauthorized("Invalid old password"));
        }

        let password_hash = self.hasher.hash(new_password).map_err(|e| {
            error!("Failed to hash password: {}", e);
            AccountError::internal()
        })?;
        self.users
            .update_password_hash(user.id, &password_hash)
            .await
            .map_err(store_failure("Failed to update password"))?;

        info!("Password changed for user {}", user.id);
        Ok(())
    }
}
