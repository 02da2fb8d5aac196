//! Credential codec for signed, expiring access and refresh tokens
//!
//! Tokens are HS256 JWTs. Access and refresh tokens are signed with distinct
//! secrets and carry a `token_type` tag; verification rejects a token that is
//! presented in the wrong slot. Expiry is checked against an injected
//! [`Clock`] rather than inside `jsonwebtoken`, so it can be driven in tests.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Secret for signing access tokens
    pub access_secret: String,
    /// Secret for signing refresh tokens
    pub refresh_secret: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 10 days)
    pub refresh_token_expiry: u64,
}

impl TokenConfig {
    /// Create a new TokenConfig from environment variables
    ///
    /// # Environment Variables
    /// - `ACCESS_TOKEN_SECRET`: Secret for signing access tokens
    /// - `REFRESH_TOKEN_SECRET`: Secret for signing refresh tokens
    /// - `ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 864000)
    pub fn from_env() -> anyhow::Result<Self> {
        let access_secret = std::env::var("ACCESS_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("ACCESS_TOKEN_SECRET environment variable not set"))?;

        let refresh_secret = std::env::var("REFRESH_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("REFRESH_TOKEN_SECRET environment variable not set"))?;

        let access_token_expiry = std::env::var("ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "900".to_string()) // 15 minutes
            .parse()
            .unwrap_or(900);

        let refresh_token_expiry = std::env::var("REFRESH_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "864000".to_string()) // 10 days
            .parse()
            .unwrap_or(864000);

        let config = TokenConfig {
            access_secret,
            refresh_secret,
            access_token_expiry,
            refresh_token_expiry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the codec relies on
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            anyhow::bail!("token secrets must not be empty");
        }
        if self.access_secret == self.refresh_secret {
            anyhow::bail!("access and refresh token secrets must differ");
        }
        if self.access_token_expiry == 0 {
            anyhow::bail!("ACCESS_TOKEN_EXPIRY must be positive");
        }
        if self.access_token_expiry >= self.refresh_token_expiry {
            anyhow::bail!("ACCESS_TOKEN_EXPIRY must be shorter than REFRESH_TOKEN_EXPIRY");
        }
        Ok(())
    }
}

/// Token type tag carried inside the signed payload
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

impl TokenType {
    fn other(self) -> Self {
        match self {
            TokenType::Access => TokenType::Refresh,
            TokenType::Refresh => TokenType::Access,
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Unique token id, so two tokens minted in the same second still differ
    pub jti: Uuid,
    /// Issued at time
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

/// Reasons a token fails verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature did not verify, or the token is not a well-formed JWT
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    /// Valid token of the other type
    #[error("token type mismatch: expected {expected:?}")]
    TypeMismatch { expected: TokenType },
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Source of "now" in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Clone)]
struct SlotKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: i64,
}

impl SlotKeys {
    fn new(secret: &str, ttl: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: i64::try_from(ttl).unwrap_or(i64::MAX),
        }
    }
}

/// Issues and verifies access and refresh tokens
#[derive(Clone)]
pub struct TokenCodec {
    access: SlotKeys,
    refresh: SlotKeys,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Build a codec on the wall clock
    pub fn new(config: &TokenConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a codec on a caller-supplied clock
    pub fn with_clock(config: &TokenConfig, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against `clock` in `verify`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            access: SlotKeys::new(&config.access_secret, config.access_token_expiry),
            refresh: SlotKeys::new(&config.refresh_secret, config.refresh_token_expiry),
            validation,
            clock,
        }
    }

    fn slot(&self, token_type: TokenType) -> &SlotKeys {
        match token_type {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    fn issue(&self, subject: Uuid, token_type: TokenType) -> Result<String, TokenError> {
        let slot = self.slot(token_type);
        let now = self.clock.now();

        let claims = Claims {
            sub: subject,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now.saturating_add(slot.ttl),
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &slot.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Generate an access token for a user
    pub fn issue_access_token(&self, subject: Uuid) -> Result<String, TokenError> {
        self.issue(subject, TokenType::Access)
    }

    /// Generate a refresh token for a user
    pub fn issue_refresh_token(&self, subject: Uuid) -> Result<String, TokenError> {
        self.issue(subject, TokenType::Refresh)
    }

    fn decode_with(&self, token: &str, token_type: TokenType) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.slot(token_type).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidSignature,
            })
    }

    /// Verify `token` as a token of type `expected`, returning its claims
    pub fn verify_claims(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = match self.decode_with(token, expected) {
            Ok(claims) => claims,
            Err(TokenError::InvalidSignature) => {
                // a token signed for the other slot is reported as a type mismatch
                return match self.decode_with(token, expected.other()) {
                    Ok(_) => Err(TokenError::TypeMismatch { expected }),
                    Err(_) => Err(TokenError::InvalidSignature),
                };
            }
            Err(other) => return Err(other),
        };

        if claims.token_type != expected {
            return Err(TokenError::TypeMismatch { expected });
        }

        if claims.exp <= self.clock.now() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Verify `token` as a token of type `expected`, returning its subject
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Uuid, TokenError> {
        self.verify_claims(token, expected).map(|claims| claims.sub)
    }
}
