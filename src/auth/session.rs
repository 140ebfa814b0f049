//! Session issuance, rotation and revocation.
//!
//! Access tokens are stateless. Refresh tokens are persisted only as SHA-256
//! hashes; presenting one looks it up with a constant-time scan over the
//! owner's rows and consumes it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::jwt::JwtConfig;
use super::Identity;
use crate::models::{NewRefreshCredential, RefreshCredential, Role};
use crate::store::{CredentialStore, StoreError, UserStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<jwt_simple::Error> for SessionError {
    fn from(err: jwt_simple::Error) -> Self {
        Self::Signing(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn hashes_match(presented: &str, stored: &str) -> bool {
    bool::from(presented.as_bytes().ct_eq(stored.as_bytes()))
}

pub struct SessionEngine {
    jwt: Arc<JwtConfig>,
    credentials: Arc<dyn CredentialStore>,
    users: Arc<dyn UserStore>,
}

impl SessionEngine {
    pub fn new(
        jwt: Arc<JwtConfig>,
        credentials: Arc<dyn CredentialStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            jwt,
            credentials,
            users,
        }
    }

    fn mint(
        &self,
        user_id: Uuid,
        role: Role,
        verified: bool,
    ) -> Result<(SessionTokens, NewRefreshCredential), SessionError> {
        let access_token = self.jwt.generate_access_token(user_id, role, verified)?;
        let refresh_token = self.jwt.generate_refresh_token(user_id)?;

        let credential = NewRefreshCredential {
            user_id,
            secret_hash: hash_token(&refresh_token),
            expires_at: (Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry))
                .naive_utc(),
        };

        let tokens = SessionTokens {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expiry,
        };
        Ok((tokens, credential))
    }

    /// Finds the live credential row matching a presented refresh token.
    fn locate(&self, refresh_token: &str) -> Result<RefreshCredential, SessionError> {
        let claims = self.jwt.verify_refresh_token(refresh_token).map_err(|e| {
            debug!(error = %e, "Refresh token rejected");
            SessionError::InvalidToken
        })?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| SessionError::InvalidToken)?;

        let presented = hash_token(refresh_token);
        let now = Utc::now().naive_utc();

        self.credentials
            .list_for_user(user_id)?
            .into_iter()
            .find(|row| row.expires_at >= now && hashes_match(&presented, &row.secret_hash))
            .ok_or_else(|| {
                warn!(user_id = %user_id, "Refresh token has no live credential");
                SessionError::InvalidToken
            })
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        role: Role,
        verified: bool,
    ) -> Result<SessionTokens, SessionError> {
        let purged = self
            .credentials
            .purge_expired(user_id, Utc::now().naive_utc())?;
        if purged > 0 {
            info!(user_id = %user_id, deleted_count = purged, "Cleaned up expired refresh tokens");
        }

        let (tokens, credential) = self.mint(user_id, role, verified)?;
        self.credentials.insert(credential)?;

        Ok(tokens)
    }

    /// Exchanges a refresh token for a new pair. The presented token is
    /// consumed; presenting it again fails.
    pub fn rotate(&self, refresh_token: &str) -> Result<SessionTokens, SessionError> {
        let row = self.locate(refresh_token)?;

        let user = self.users.find_by_id(row.user_id)?.ok_or_else(|| {
            warn!(user_id = %row.user_id, "Refresh token for a user that no longer exists");
            SessionError::InvalidToken
        })?;

        let (tokens, credential) = self.mint(user.id, user.role, user.verified)?;

        match self.credentials.replace(row.id, credential)? {
            Some(_) => {
                info!(user_id = %user.id, "Tokens refreshed (rotated)");
                Ok(tokens)
            }
            None => {
                warn!(user_id = %user.id, "Refresh token consumed concurrently");
                Err(SessionError::InvalidToken)
            }
        }
    }

    pub fn revoke(&self, refresh_token: &str) -> Result<(), SessionError> {
        let row = self.locate(refresh_token)?;

        if !self.credentials.delete(row.id)? {
            return Err(SessionError::InvalidToken);
        }

        info!(user_id = %row.user_id, "User logged out");
        Ok(())
    }

    pub fn revoke_all(&self, user_id: Uuid) -> Result<usize, SessionError> {
        let revoked = self.credentials.delete_all_for_user(user_id)?;
        info!(user_id = %user_id, revoked_count = revoked, "All sessions revoked");
        Ok(revoked)
    }

    pub fn authenticate(&self, access_token: &str) -> Result<Identity, SessionError> {
        let claims = self
            .jwt
            .verify_access_token(access_token)
            .map_err(|_| SessionError::InvalidToken)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| SessionError::InvalidToken)?;

        Ok(Identity {
            user_id,
            role: claims.role,
            verified: claims.verified,
            expires_at: claims.exp,
        })
    }
}
