//! Shared test utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use mattone::api::{ApiServer, ApiServerBuilder};
use mattone::config::CognitoConfig;
use mattone::{DbPool, db};
use serde_json::json;
use tokio::net::TcpListener;

/// Key ID of the test signing key
pub const KID: &str = "test-key-1";

/// Base64url modulus of `fixtures/signing_key.pem`
pub const N: &str = "3lqlkhYWrUHs6dAiIIM4SEkYz8F07CnFyZ_3qtf3n6ADIql5JyonZYQsUrA0lOK064DjM-96znxjyW8PpQBkMTq3yAD7A2nZV_Ay-Gp-Gj4xZuOT3W0t2f8Fp7bN2h7BOJOTA9U24rOhRHgLOEjo0gY8H5WAOebuuX3Mr0ZTbWwFj-nmgg7XuqQGSnQpH5pssPngkXD30t3mgKm1pcwylBeANATGFCVPDcjqp_nXwZBLK7Te6AVv1Ko3HTkja9DpXgA4pIRxnWgvMlmHR-embsQI9yGUH747uhS7rCPGMXGcdhe9HRpmc3s7JqbF7AgSEVxf1ag-iPXx1r40BJIPWw";

/// Base64url public exponent of `fixtures/signing_key.pem`
pub const E: &str = "AQAB";

pub const REGION: &str = "eu-west-1";
pub const POOL_ID: &str = "eu-west-1_TEST";
pub const CLIENT_ID: &str = "test-client";

/// A two-channel playlist served at `/lists/good.m3u`
pub const GOOD_PLAYLIST: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-name=\"Alpha\" tvg-logo=\"http://img/a.png\" group-title=\"News\",Alpha HD\n\
http://streams/alpha\n\
#EXTINF:-1,Bravo\n\
http://streams/bravo\n";

const SIGNING_KEY_PEM: &[u8] = include_bytes!("../fixtures/signing_key.pem");

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Expected token issuer for the test pool
#[must_use]
pub fn issuer() -> String {
    format!("https://cognito-idp.{REGION}.amazonaws.com/{POOL_ID}")
}

/// Counters and switches of a running [`Upstream`]
#[derive(Default)]
pub struct UpstreamState {
    pub key_set_hits: AtomicUsize,
    pub fail_key_set: AtomicBool,
}

/// Local stand-in for the identity provider and a playlist host
pub struct Upstream {
    pub addr: SocketAddr,
    pub state: Arc<UpstreamState>,
}

impl Upstream {
    /// Start serving on an ephemeral port
    pub async fn start() -> Self {
        let state = Arc::new(UpstreamState::default());

        let app = Router::new()
            .route("/.well-known/jwks.json", get(key_set))
            .route("/lists/good.m3u", get(|| async { GOOD_PLAYLIST }))
            .route("/lists/empty.m3u", get(|| async { "#EXTM3U\n" }))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind upstream");
        let addr = listener.local_addr().expect("upstream has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("upstream failed");
        });

        Self { addr, state }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    #[must_use]
    pub fn key_set_url(&self) -> String {
        self.url("/.well-known/jwks.json")
    }

    #[must_use]
    pub fn key_set_hits(&self) -> usize {
        self.state.key_set_hits.load(Ordering::SeqCst)
    }

    pub fn fail_key_set(&self, fail: bool) {
        self.state.fail_key_set.store(fail, Ordering::SeqCst);
    }

    /// Cognito settings pointing at this upstream's key set
    #[must_use]
    pub fn cognito(&self) -> CognitoConfig {
        CognitoConfig {
            region: REGION.to_string(),
            user_pool_id: POOL_ID.to_string(),
            client_id: CLIENT_ID.to_string(),
            jwks_url: Some(self.key_set_url()),
        }
    }
}

async fn key_set(State(state): State<Arc<UpstreamState>>) -> Response {
    state.key_set_hits.fetch_add(1, Ordering::SeqCst);
    // Slow enough that concurrent callers overlap with the fetch
    tokio::time::sleep(Duration::from_millis(50)).await;

    if state.fail_key_set.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    Json(json!({
        "keys": [
            {"kid": "unrelated", "kty": "RSA", "alg": "RS256", "use": "sig", "n": N, "e": E},
            {"kid": KID, "kty": "RSA", "alg": "RS256", "use": "sig", "n": N, "e": E}
        ]
    }))
    .into_response()
}

/// Sign claims with the test key under `kid`
#[must_use]
pub fn sign_with_kid(claims: &serde_json::Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM).expect("invalid test signing key");
    jsonwebtoken::encode(&header, claims, &key).expect("failed to sign test token")
}

/// Sign claims with the published test key
#[must_use]
pub fn sign(claims: &serde_json::Value) -> String {
    sign_with_kid(claims, KID)
}

/// Claims of a valid ID token for `subject`
#[must_use]
pub fn id_token_claims(subject: &str) -> serde_json::Value {
    json!({
        "iss": issuer(),
        "sub": subject,
        "aud": CLIENT_ID,
        "exp": chrono::Utc::now().timestamp() + 3600,
        "token_use": "id",
    })
}

/// Signed, valid bearer header value for `subject`
#[must_use]
pub fn bearer(subject: &str) -> String {
    format!("Bearer {}", sign(&id_token_claims(subject)))
}

/// API server wired to the upstream, with a short heartbeat for tests
#[must_use]
pub fn build_server(db: DbPool, upstream: &Upstream) -> ApiServer {
    ApiServerBuilder::new(db, upstream.cognito(), 0)
        .heartbeat_interval(Duration::from_millis(200))
        .dispatch_timeout(Duration::from_secs(2))
        .build()
}
