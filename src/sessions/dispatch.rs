//! Command delivery to connected devices

use std::time::Duration;

use thiserror::Error;

use super::registry::SharedSessionRegistry;
use super::types::{Command, PushFrame, SinkError};

/// Why a command was not delivered
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("device {0} is not connected")]
    NotConnected(String),

    #[error("push channel of device {0} cannot stream")]
    StreamingUnsupported(String),

    #[error("failed to encode command: {0}")]
    EncodingFailed(#[from] serde_json::Error),

    #[error("device {0} disconnected during delivery")]
    Disconnected(String),

    #[error("delivery to device {0} timed out")]
    TimedOut(String),
}

/// Sends commands down devices' push channels
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: SharedSessionRegistry,
    write_timeout: Duration,
}

impl CommandDispatcher {
    #[must_use]
    pub const fn new(registry: SharedSessionRegistry, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// Deliver one command as a single `data:` event and flush it
    ///
    /// # Errors
    ///
    /// Returns error if the device has no push channel, the channel cannot
    /// be flushed, or the write fails or exceeds the write timeout
    pub async fn send(&self, device_id: &str, command: &Command) -> Result<(), DispatchError> {
        let Some(handle) = self.registry.lookup(device_id) else {
            tracing::debug!(device_id = %device_id, command = command.kind(), "device not connected");
            return Err(DispatchError::NotConnected(device_id.to_string()));
        };

        let sink = handle.sink();
        if !sink.can_flush() {
            return Err(DispatchError::StreamingUnsupported(device_id.to_string()));
        }

        let data = serde_json::to_string(command)?;
        let delivery = async {
            sink.write(PushFrame::Data(data)).await?;
            sink.flush().await
        };

        match tokio::time::timeout(self.write_timeout, delivery).await {
            Ok(Ok(())) => {
                tracing::info!(
                    device_id = %device_id,
                    connection_id = %handle.id(),
                    command = command.kind(),
                    "command sent"
                );
                Ok(())
            }
            Ok(Err(SinkError::Unsupported)) => {
                Err(DispatchError::StreamingUnsupported(device_id.to_string()))
            }
            Ok(Err(SinkError::Closed)) => {
                tracing::warn!(device_id = %device_id, "push channel closed during delivery");
                Err(DispatchError::Disconnected(device_id.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    device_id = %device_id,
                    timeout_ms = u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX),
                    "command delivery timed out"
                );
                Err(DispatchError::TimedOut(device_id.to_string()))
            }
        }
    }
}
