//! HTTP API server for mattone

mod auth;
pub mod channels;
pub mod devices;
mod error;
pub mod events;
pub mod health;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorDetail, ErrorResponse};

use crate::Result;
use crate::config::{CognitoConfig, DEFAULT_DISPATCH_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL};
use crate::db::{ChannelRepo, DbPool, DeviceRepo, UserRepo};
use crate::playlist::PlaylistImporter;
use crate::security::{KeySetCache, TokenAuthenticator};
use crate::sessions::{CommandDispatcher, SessionRegistry, SharedSessionRegistry};

/// Shared state for API handlers
pub struct ApiState {
    pub db: DbPool,
    pub devices: DeviceRepo,
    pub channels: ChannelRepo,
    pub key_set: Arc<KeySetCache>,
    pub authenticator: TokenAuthenticator,
    pub sessions: SharedSessionRegistry,
    pub dispatcher: CommandDispatcher,
    pub importer: PlaylistImporter,
    /// Interval between keep-alive comments on push channels
    pub heartbeat_interval: Duration,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    db: DbPool,
    cognito: CognitoConfig,
    port: u16,
    key_set: Option<Arc<KeySetCache>>,
    sessions: Option<SharedSessionRegistry>,
    dispatch_timeout: Duration,
    heartbeat_interval: Duration,
    rate_limit_rpm: u32,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(db: DbPool, cognito: CognitoConfig, port: u16) -> Self {
        Self {
            db,
            cognito,
            port,
            key_set: None,
            sessions: None,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            rate_limit_rpm: 0,
        }
    }

    /// Use an existing signing key cache instead of one built from the pool settings
    #[must_use]
    pub fn key_set(mut self, key_set: Arc<KeySetCache>) -> Self {
        self.key_set = Some(key_set);
        self
    }

    /// Use an existing session registry
    #[must_use]
    pub fn sessions(mut self, sessions: SharedSessionRegistry) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Set the upper bound for delivering one command
    #[must_use]
    pub const fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Set the push channel keep-alive interval
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the global request budget per minute (0 disables limiting)
    #[must_use]
    pub const fn rate_limit_rpm(mut self, rpm: u32) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let users = UserRepo::new(self.db.clone());
        let devices = DeviceRepo::new(self.db.clone());
        let channels = ChannelRepo::new(self.db.clone());

        let key_set = self
            .key_set
            .unwrap_or_else(|| Arc::new(KeySetCache::new(self.cognito.jwks_url())));
        let authenticator = TokenAuthenticator::new(Arc::clone(&key_set), &self.cognito, users);

        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(SessionRegistry::new()));
        let dispatcher = CommandDispatcher::new(Arc::clone(&sessions), self.dispatch_timeout);

        let state = Arc::new(ApiState {
            importer: PlaylistImporter::new(channels.clone()),
            db: self.db,
            devices,
            channels,
            key_set,
            authenticator,
            sessions,
            dispatcher,
            heartbeat_interval: self.heartbeat_interval,
            rate_limiter: rate_limit::create_limiter(self.rate_limit_rpm),
        });

        ApiServer {
            state,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        Arc::clone(&self.state)
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(devices::public_router(self.state.clone()))
            .merge(devices::router(self.state.clone()))
            .merge(channels::router(self.state.clone()))
            .merge(events::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        let router = router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            rate_limit::rate_limit_middleware,
        ));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
            tracing::error!(addr = %addr, error = %e, "failed to bind API server");
        })?;

        tracing::info!(
            port = self.port,
            rate_limited = self.state.rate_limiter.is_some(),
            "API server listening"
        );

        axum::serve(listener, self.router()).await?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
