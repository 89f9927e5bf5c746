//! Outbound Responder: serializes replies and hands them to the transport broadcast.

use crate::transport::{CallTransport, TransportError};
use skin_doctor_core::protocol::OutboundReply;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("reply could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("reply could not be sent: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Clone)]
pub struct Responder {
    transport: Arc<dyn CallTransport>,
}

impl Responder {
    pub fn new(transport: Arc<dyn CallTransport>) -> Self {
        Self { transport }
    }

    /// Sends `reply` once. A failed send is logged and the reply is dropped.
    pub fn send(&self, reply: &OutboundReply) -> Result<(), ResponderError> {
        let payload = serde_json::to_value(reply.envelope())?;
        match self.transport.send_broadcast_message(payload) {
            Ok(()) => {
                info!(conversation_id = %reply.conversation_id, "Reply sent");
                Ok(())
            }
            Err(e) => {
                error!(conversation_id = %reply.conversation_id, error = %e, "Failed to send reply; dropping it");
                Err(e.into())
            }
        }
    }
}
