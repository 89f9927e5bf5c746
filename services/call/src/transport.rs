//! The call-object surface this crate needs from the media transport.
//!
//! Connection setup, track negotiation and screen capture all live behind
//! [`CallTransport`]. The session only issues commands, reads the roster and consumes
//! the stream of [`TransportEvent`]s.

use async_trait::async_trait;
use serde_json::Value;
use skin_doctor_core::roster::ParticipantSnapshot;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("media error: {0}")]
    Media(String),
    #[error("message could not be sent: {0}")]
    Send(String),
}

/// Signals raised by the transport for an attached subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ParticipantJoined { id: String },
    ParticipantUpdated { id: String },
    ParticipantLeft { id: String },
    /// A structured envelope received over the side channel.
    AppMessage(Value),
    StartedScreenShare,
    StoppedScreenShare,
    JoinedMeeting,
    LeftMeeting,
    Error(String),
}

/// Receiving end of an event subscription. Dropping it detaches the subscription.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

#[async_trait]
pub trait CallTransport: Send + Sync {
    async fn join(&self, url: &str, display_name: &str) -> Result<(), TransportError>;

    /// Leaves the call. Must succeed as a no-op when not joined.
    async fn leave(&self) -> Result<(), TransportError>;

    async fn start_screen_share(&self) -> Result<(), TransportError>;

    async fn stop_screen_share(&self) -> Result<(), TransportError>;

    /// Current roster, keyed by participant id.
    fn participants(&self) -> HashMap<String, ParticipantSnapshot>;

    /// Best-effort delivery of `payload` to every peer.
    fn send_broadcast_message(&self, payload: Value) -> Result<(), TransportError>;

    /// Attaches a subscription to every call event.
    fn subscribe(&self) -> TransportEvents;

    /// Detaches every subscription previously handed out.
    fn unsubscribe_all(&self);
}
