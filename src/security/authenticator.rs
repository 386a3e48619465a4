//! Bearer token authentication against the identity provider's keys

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;

use super::keyset::{FetchError, KeySetCache, SigningKey};
use crate::config::CognitoConfig;
use crate::db::UserRepo;

/// Authenticated caller, resolved to a local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    /// Identity provider subject (`sub` claim)
    pub subject: String,
}

/// Why a request could not be authenticated
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header required")]
    MissingCredentials,

    #[error("invalid authorization header: {0}")]
    Malformed(String),

    #[error("signing keys unavailable: {0}")]
    KeyUnavailable(#[from] FetchError),

    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    #[error("invalid token signature: {0}")]
    InvalidSignature(String),

    #[error("invalid token claims: {0}")]
    InvalidClaims(String),

    #[error("failed to resolve user: {0}")]
    Store(#[from] crate::Error),
}

/// Claims of a token whose signature and expiry checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: String,
    pub issuer: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, id: &str) -> bool {
        match self {
            Self::One(aud) => aud == id,
            Self::Many(auds) => auds.iter().any(|aud| aud == id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    /// Access tokens carry the app client here instead of in `aud`
    #[serde(default)]
    client_id: Option<String>,
}

/// Validates bearer tokens and maps their subject to a local user
pub struct TokenAuthenticator {
    keys: Arc<KeySetCache>,
    issuer: String,
    client_id: String,
    users: UserRepo,
}

impl TokenAuthenticator {
    /// Create an authenticator for tokens minted by the given user pool
    #[must_use]
    pub fn new(keys: Arc<KeySetCache>, cognito: &CognitoConfig, users: UserRepo) -> Self {
        Self {
            keys,
            issuer: cognito.issuer(),
            client_id: cognito.client_id.clone(),
            users,
        }
    }

    /// Expected `iss` claim
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Authenticate an `Authorization` header value
    ///
    /// A subject seen for the first time gets a local user created.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed: header shape, key lookup,
    /// signature, claims, then user resolution
    pub async fn authenticate(&self, authorization: &str) -> Result<Principal, AuthError> {
        let token = bearer_token(authorization)?;
        let claims = self.verify(token).await?;
        let user = self.users.find_or_create_by_subject(&claims.subject)?;

        Ok(Principal {
            user_id: user.id,
            subject: claims.subject,
        })
    }

    /// Verify a raw token's signature and claims
    ///
    /// # Errors
    ///
    /// Returns error if the token is malformed, signed by an unknown key,
    /// fails signature or expiry validation, or carries the wrong issuer,
    /// audience, or subject
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::Malformed(format!("token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Malformed("token header has no kid".to_string()))?;

        self.keys.ensure_fresh().await?;
        let key = self
            .keys
            .find_key(&kid)
            .await
            .ok_or_else(|| AuthError::UnknownKey(kid.clone()))?;

        let decoding_key = rsa_decoding_key(&key, header.alg)?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let claims = decode::<TokenClaims>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature
                | ErrorKind::ImmatureSignature
                | ErrorKind::MissingRequiredClaim(_) => AuthError::InvalidClaims(e.to_string()),
                _ => AuthError::InvalidSignature(e.to_string()),
            })?
            .claims;

        tracing::debug!(kid = %kid, alg = ?header.alg, "token signature verified");
        self.check_claims(claims)
    }

    fn check_claims(&self, claims: TokenClaims) -> Result<VerifiedClaims, AuthError> {
        let issuer = claims.iss.unwrap_or_default();
        if issuer != self.issuer {
            return Err(AuthError::InvalidClaims(format!(
                "unexpected issuer {issuer:?}"
            )));
        }

        let audience_ok = claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.client_id));
        let client_ok = claims.client_id.as_deref() == Some(self.client_id.as_str());
        if !audience_ok && !client_ok {
            return Err(AuthError::InvalidClaims(
                "token not issued for this client".to_string(),
            ));
        }

        let subject = claims.sub.unwrap_or_default();
        if subject.is_empty() {
            return Err(AuthError::InvalidClaims("missing subject".to_string()));
        }

        Ok(VerifiedClaims { subject, issuer })
    }
}

/// Extract the token from a `Bearer <token>` header value
fn bearer_token(authorization: &str) -> Result<&str, AuthError> {
    let mut parts = authorization.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::Malformed(
            "expected \"Bearer <token>\"".to_string(),
        )),
    }
}

fn rsa_decoding_key(key: &SigningKey, alg: Algorithm) -> Result<DecodingKey, AuthError> {
    if key.kty != "RSA" {
        return Err(AuthError::InvalidSignature(format!(
            "key {} has unsupported type {}",
            key.kid, key.kty
        )));
    }

    if !matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    ) {
        return Err(AuthError::InvalidSignature(format!(
            "algorithm {alg:?} is not an RSA algorithm"
        )));
    }

    if let Some(key_alg) = &key.alg {
        let declared = key_alg.parse::<Algorithm>().ok();
        if declared != Some(alg) {
            return Err(AuthError::InvalidSignature(format!(
                "key {} is for {key_alg}, token uses {alg:?}",
                key.kid
            )));
        }
    }

    let modulus = URL_SAFE_NO_PAD
        .decode(&key.n)
        .map_err(|e| AuthError::InvalidSignature(format!("key {} modulus: {e}", key.kid)))?;
    let exponent = URL_SAFE_NO_PAD
        .decode(&key.e)
        .map_err(|e| AuthError::InvalidSignature(format!("key {} exponent: {e}", key.kid)))?;

    Ok(DecodingKey::from_rsa_raw_components(&modulus, &exponent))
}
