//! Credentials: password hashing, signed tokens and refresh sessions.

pub mod jwt;
pub mod password;
pub mod session;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Role;

pub use session::{hash_token, SessionEngine, SessionError, SessionTokens};

/// Caller identity decoded from a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub verified: bool,
    /// Unix seconds.
    pub expires_at: i64,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}
