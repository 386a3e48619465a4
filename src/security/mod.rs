//! Caller authentication
//!
//! Tokens are RS256 (or another RSA family algorithm) JWTs minted by a
//! Cognito user pool. Verification keys come from the pool's published key
//! set, cached process-wide by [`KeySetCache`].

pub mod authenticator;
pub mod keyset;

pub use authenticator::{AuthError, Principal, TokenAuthenticator, VerifiedClaims};
pub use keyset::{FetchError, KeySet, KeySetCache, SigningKey};
