//! Ed25519 access and refresh tokens.

use jwt_simple::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Role;

/// Clock skew tolerated when checking `exp` and `iat`.
pub const LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub role: Role,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCustomClaims {
    pub token_id: String,
}

/// Verified access token contents.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub verified: bool,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    /// Loads the signing key from `JWT_PRIVATE_KEY` (base64-encoded Ed25519
    /// key pair) and takes lifetimes and claims from `settings`.
    pub fn from_env(settings: &crate::config::JwtConfig) -> Self {
        use base64::Engine;

        let private_key_b64 =
            std::env::var("JWT_PRIVATE_KEY").expect("JWT_PRIVATE_KEY must be set");

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(private_key_b64.trim())
            .expect("JWT_PRIVATE_KEY must be valid base64");

        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes)
            .expect("JWT_PRIVATE_KEY must be a valid Ed25519 key");

        Self::from_key_pair(key_pair).with_settings(settings)
    }

    /// 15 minute access tokens and 7 day refresh tokens.
    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
            issuer: None,
            audience: None,
        }
    }

    pub fn with_settings(mut self, settings: &crate::config::JwtConfig) -> Self {
        self.access_token_expiry = settings.access_token_expiry_secs;
        self.refresh_token_expiry = settings.refresh_token_expiry_secs;
        self.issuer = settings.issuer.clone();
        self.audience = settings.audience.clone();
        self
    }

    pub fn generate_key_pair() -> (String, String) {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        let private_b64 = base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes());
        let public_b64 =
            base64::engine::general_purpose::STANDARD.encode(key_pair.public_key().to_bytes());
        (private_b64, public_b64)
    }

    pub fn public_key(&self) -> &Ed25519PublicKey {
        &self.public_key
    }

    fn stamp<T: Serialize + DeserializeOwned>(
        &self,
        custom: T,
        lifetime_secs: i64,
        user_id: Uuid,
    ) -> JWTClaims<T> {
        let mut claims = jwt_simple::claims::Claims::with_custom_claims(
            custom,
            Duration::from_secs(lifetime_secs.max(0) as u64),
        )
        .with_subject(user_id.to_string());

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }
        claims
    }

    fn verification_options(&self) -> VerificationOptions {
        VerificationOptions {
            time_tolerance: Some(Duration::from_secs(LEEWAY_SECS)),
            allowed_issuers: self.issuer.clone().map(|i| HashSet::from([i])),
            allowed_audiences: self.audience.clone().map(|a| HashSet::from([a])),
            ..Default::default()
        }
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        role: Role,
        verified: bool,
    ) -> Result<String, jwt_simple::Error> {
        let claims = self.stamp(
            AccessClaims { role, verified },
            self.access_token_expiry,
            user_id,
        );
        self.key_pair.sign(claims)
    }

    /// Each refresh token carries a fresh random id, so two tokens issued to
    /// the same user in the same second still differ.
    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String, jwt_simple::Error> {
        let claims = self.stamp(
            RefreshCustomClaims {
                token_id: Uuid::new_v4().to_string(),
            },
            self.refresh_token_expiry,
            user_id,
        );
        self.key_pair.sign(claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let token_data = self
            .public_key
            .verify_token::<AccessClaims>(token, Some(self.verification_options()))?;

        Ok(Claims {
            sub: token_data.subject.unwrap_or_default(),
            role: token_data.custom.role,
            verified: token_data.custom.verified,
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, jwt_simple::Error> {
        let token_data = self
            .public_key
            .verify_token::<RefreshCustomClaims>(token, Some(self.verification_options()))?;

        Ok(RefreshClaims {
            sub: token_data.subject.unwrap_or_default(),
            token_id: token_data.custom.token_id,
            exp: token_data
                .expires_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
            iat: token_data
                .issued_at
                .map(|t| t.as_secs() as i64)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_access_token_carries_role_and_verified() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, Role::Consumer, true)
            .expect("Token generation should succeed");
        let claims = config
            .verify_access_token(&token)
            .expect("Token verification should succeed");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Consumer);
        assert!(claims.verified);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let first = config.generate_refresh_token(user_id).unwrap();
        let second = config.generate_refresh_token(user_id).unwrap();
        assert_ne!(first, second);

        let claims = config.verify_refresh_token(&first).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let config = test_config();
        let refresh = config.generate_refresh_token(Uuid::new_v4()).unwrap();
        assert!(config.verify_access_token(&refresh).is_err());
    }

    #[test]
    fn test_expired_token_fails_verification() {
        let config = test_config();
        let mut claims = config.stamp(
            AccessClaims {
                role: Role::Admin,
                verified: true,
            },
            900,
            Uuid::new_v4(),
        );
        let past = Clock::now_since_epoch() - Duration::from_secs(LEEWAY_SECS + 120);
        claims.issued_at = Some(past - Duration::from_secs(900));
        claims.expires_at = Some(past);

        let token = config.key_pair.sign(claims).unwrap();
        assert!(config.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = test_config();
        let verifier = test_config();

        let token = signer
            .generate_access_token(Uuid::new_v4(), Role::Owner, false)
            .unwrap();
        assert!(verifier.verify_access_token(&token).is_err());
        assert!(signer.verify_access_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_issuer_is_enforced() {
        let mut signer = test_config();
        signer.issuer = Some("office-hours".to_string());
        let token = signer
            .generate_access_token(Uuid::new_v4(), Role::Consumer, true)
            .unwrap();

        let mut verifier = signer.clone();
        verifier.issuer = Some("someone-else".to_string());
        assert!(signer.verify_access_token(&token).is_ok());
        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_generated_key_round_trips() {
        use base64::Engine;

        let (private_b64, public_b64) = JwtConfig::generate_key_pair();
        assert!(!public_b64.is_empty());

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_b64)
            .unwrap();
        let config = JwtConfig::from_key_pair(Ed25519KeyPair::from_bytes(&key_bytes).unwrap());

        let token = config
            .generate_access_token(Uuid::new_v4(), Role::Admin, true)
            .unwrap();
        assert!(config.verify_access_token(&token).is_ok());
    }
}
