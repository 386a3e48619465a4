//! Mattone - remote playback control for set-top devices
//!
//! This library provides the core functionality of the mattone service:
//! - Bearer token authentication against a Cognito user pool
//! - Device registration and live push channels (server-sent events)
//! - Command dispatch (`play`, `stop`) to connected devices
//! - A channel catalog imported from M3U playlists
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │   Controller apps    │        │   Playback devices   │
//! │  (Bearer token API)  │        │  (GET /sse/events)   │
//! └──────────┬───────────┘        └──────────▲───────────┘
//!            │                               │
//! ┌──────────▼───────────────────────────────┴───────────┐
//! │                     HTTP API                         │
//! │  TokenAuthenticator │ CommandDispatcher │ Importer   │
//! └──────────┬──────────────────┬────────────────────────┘
//!            │                  │
//! ┌──────────▼─────────┐ ┌──────▼───────────────────────┐
//! │  SQLite (users,    │ │  SessionRegistry             │
//! │  devices, channels)│ │  device code -> push channel │
//! └────────────────────┘ └──────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod playlist;
pub mod security;
pub mod sessions;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use playlist::{ImportError, ImportSummary, PlaylistEntry, PlaylistImporter};
pub use security::{AuthError, KeySetCache, Principal, TokenAuthenticator};
pub use sessions::{Command, CommandDispatcher, DispatchError, SessionRegistry};
