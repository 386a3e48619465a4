//! Command and push channel types

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

/// Comment text of keep-alive frames
pub const HEARTBEAT: &str = "heartbeat";

/// A command pushed to a device
///
/// Serializes as `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Command {
    Play(PlaySource),
    Stop {},
}

impl Command {
    /// Play a stream URL (an M3U channel)
    #[must_use]
    pub fn play_url(url: impl Into<String>) -> Self {
        Self::Play(PlaySource::Url { url: url.into() })
    }

    /// Play a `YouTube` video by ID
    #[must_use]
    pub fn play_video(video_id: impl Into<String>) -> Self {
        Self::Play(PlaySource::Video {
            video_id: video_id.into(),
        })
    }

    /// Stop playback
    #[must_use]
    pub const fn stop() -> Self {
        Self::Stop {}
    }

    /// Command name as sent in the `type` field
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Play(_) => "play",
            Self::Stop {} => "stop",
        }
    }
}

/// What a play command should play
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PlaySource {
    Url {
        url: String,
    },
    Video {
        #[serde(rename = "videoId")]
        video_id: String,
    },
}

/// One frame on a push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// A `data:` event carrying JSON
    Data(String),
    /// A comment line, ignored by event stream clients
    Comment(&'static str),
}

impl PushFrame {
    /// Keep-alive comment
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self::Comment(HEARTBEAT)
    }

    /// The `connected` status event
    #[must_use]
    pub fn connected() -> Self {
        Self::Data(r#"{"type":"connected"}"#.to_string())
    }

    /// Wire form as written to an event stream
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Data(data) => format!("data: {data}\n\n"),
            Self::Comment(text) => format!(":{text}\n\n"),
        }
    }
}

/// Why a push write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("connection does not support incremental flushing")]
    Unsupported,
}

/// Write side of one device's push channel
#[async_trait]
pub trait PushSink: Send + Sync {
    /// Queue a frame for the device
    async fn write(&self, frame: PushFrame) -> Result<(), SinkError>;

    /// Push queued frames out to the device
    async fn flush(&self) -> Result<(), SinkError>;

    /// Whether frames can be pushed incrementally at all
    fn can_flush(&self) -> bool {
        true
    }
}

/// Push sink backed by the channel feeding an HTTP event stream
///
/// Frames are handed straight to the response body stream, so a successful
/// write is already a flush.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PushFrame>,
}

impl ChannelSink {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<PushFrame>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl PushSink for ChannelSink {
    async fn write(&self, frame: PushFrame) -> Result<(), SinkError> {
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }

    async fn flush(&self) -> Result<(), SinkError> {
        if self.tx.is_closed() {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

/// A live push channel registered for a device
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    sink: Arc<dyn PushSink>,
    connected_at: DateTime<Utc>,
    shutdown: Arc<Notify>,
}

impl SessionHandle {
    /// Wrap a sink in a handle with a fresh connection ID
    #[must_use]
    pub fn new(sink: Arc<dyn PushSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sink,
            connected_at: Utc::now(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Identifies this connection among successive ones of the same device
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn sink(&self) -> &dyn PushSink {
        self.sink.as_ref()
    }

    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Ask the connection task to end the stream
    ///
    /// A close requested before anyone waits is kept until [`Self::closed`]
    /// is next awaited.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once [`Self::close`] has been called
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}
