//! Side-Channel Wire Protocol
//!
//! Structured events travel alongside the media connection as JSON envelopes of the
//! form `{message_type, event_type, conversation_id, properties?}`. This module turns
//! those untyped envelopes into [`InboundEvent`]s and defines the [`OutboundReply`]
//! echo that is sent back over the same channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// `message_type` shared by every conversation event.
pub const CONVERSATION_MESSAGE_TYPE: &str = "conversation";
/// `event_type` of an explicit tool invocation by the agent.
pub const TOOL_CALL_EVENT: &str = "conversation.tool_call";
/// `event_type` of a tool invocation raised by visual perception.
pub const PERCEPTION_TOOL_CALL_EVENT: &str = "conversation.perception_tool_call";
/// `event_type` of a reply echoed back to the agent.
pub const ECHO_EVENT: &str = "conversation.echo";

/// Identifier of the remote conversation an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The conversation lifecycle signals the agent broadcasts for observation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    ReplicaStartedSpeaking,
    ReplicaStoppedSpeaking,
    UserStartedSpeaking,
    UserStoppedSpeaking,
    Utterance,
    ReplicaInterrupted,
    PerceptionAnalysis,
}

impl LifecycleKind {
    const ALL: [LifecycleKind; 7] = [
        LifecycleKind::ReplicaStartedSpeaking,
        LifecycleKind::ReplicaStoppedSpeaking,
        LifecycleKind::UserStartedSpeaking,
        LifecycleKind::UserStoppedSpeaking,
        LifecycleKind::Utterance,
        LifecycleKind::ReplicaInterrupted,
        LifecycleKind::PerceptionAnalysis,
    ];

    /// The exact `event_type` string this signal is broadcast under.
    pub fn event_type(self) -> &'static str {
        match self {
            LifecycleKind::ReplicaStartedSpeaking => "conversation.replica.started_speaking",
            LifecycleKind::ReplicaStoppedSpeaking => "conversation.replica.stopped_speaking",
            LifecycleKind::UserStartedSpeaking => "conversation.user.started_speaking",
            LifecycleKind::UserStoppedSpeaking => "conversation.user.stopped_speaking",
            LifecycleKind::Utterance => "conversation.utterance",
            LifecycleKind::ReplicaInterrupted => "conversation.replica_interrupted",
            LifecycleKind::PerceptionAnalysis => "conversation.perception_analysis",
        }
    }

    fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == event_type)
    }
}

/// A well-formed event that is reported to observers and otherwise left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSignal {
    pub message_type: String,
    pub event_type: String,
    /// `None` for well-formed pairs that are not one of the known signals.
    pub kind: Option<LifecycleKind>,
    pub conversation_id: Option<ConversationId>,
    pub properties: Option<Value>,
}

/// A function invocation requested by the agent during conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallEvent {
    pub name: String,
    /// Either a JSON-encoded string or an inline object, exactly as received.
    pub raw_arguments: Value,
    pub conversation_id: ConversationId,
}

/// A function invocation raised by passive visual analysis of the video feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptionToolCallEvent {
    pub name: String,
    pub conversation_id: ConversationId,
}

/// Why an envelope could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("envelope is not a JSON object")]
    NotAnObject,
    #[error("envelope has no `message_type`")]
    MissingMessageType,
    #[error("envelope has no `event_type`")]
    MissingEventType,
    #[error("`{0}` envelope has no `properties`")]
    MissingProperties(String),
    #[error("`{0}` envelope has no tool `name`")]
    MissingToolName(String),
    #[error("`{0}` envelope has no `conversation_id`")]
    MissingConversationId(String),
}

/// A classified side-channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Lifecycle(LifecycleSignal),
    ToolCall(ToolCallEvent),
    PerceptionToolCall(PerceptionToolCallEvent),
    Unrecognized(MalformedEvent),
}

impl InboundEvent {
    /// The `event_type` this event was classified from, if it had one.
    pub fn event_type(&self) -> Option<&str> {
        match self {
            InboundEvent::Lifecycle(signal) => Some(&signal.event_type),
            InboundEvent::ToolCall(_) => Some(TOOL_CALL_EVENT),
            InboundEvent::PerceptionToolCall(_) => Some(PERCEPTION_TOOL_CALL_EVENT),
            InboundEvent::Unrecognized(_) => None,
        }
    }
}

fn non_empty_str<'a>(envelope: &'a Value, key: &str) -> Option<&'a str> {
    envelope
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Classifies a raw envelope. Pure: no logging, no mutation.
pub fn classify(envelope: &Value) -> InboundEvent {
    if !envelope.is_object() {
        return InboundEvent::Unrecognized(MalformedEvent::NotAnObject);
    }
    let Some(message_type) = non_empty_str(envelope, "message_type") else {
        return InboundEvent::Unrecognized(MalformedEvent::MissingMessageType);
    };
    let Some(event_type) = non_empty_str(envelope, "event_type") else {
        return InboundEvent::Unrecognized(MalformedEvent::MissingEventType);
    };
    let conversation_id = non_empty_str(envelope, "conversation_id").map(ConversationId::new);
    let properties = envelope.get("properties").filter(|p| !p.is_null());

    if message_type == CONVERSATION_MESSAGE_TYPE
        && (event_type == TOOL_CALL_EVENT || event_type == PERCEPTION_TOOL_CALL_EVENT)
    {
        let Some(properties) = properties else {
            return InboundEvent::Unrecognized(MalformedEvent::MissingProperties(
                event_type.to_string(),
            ));
        };
        let Some(name) = non_empty_str(properties, "name") else {
            return InboundEvent::Unrecognized(MalformedEvent::MissingToolName(
                event_type.to_string(),
            ));
        };
        let Some(conversation_id) = conversation_id else {
            return InboundEvent::Unrecognized(MalformedEvent::MissingConversationId(
                event_type.to_string(),
            ));
        };

        return if event_type == TOOL_CALL_EVENT {
            InboundEvent::ToolCall(ToolCallEvent {
                name: name.to_string(),
                raw_arguments: properties.get("arguments").cloned().unwrap_or(Value::Null),
                conversation_id,
            })
        } else {
            InboundEvent::PerceptionToolCall(PerceptionToolCallEvent {
                name: name.to_string(),
                conversation_id,
            })
        };
    }

    let kind = if message_type == CONVERSATION_MESSAGE_TYPE {
        LifecycleKind::from_event_type(event_type)
    } else {
        None
    };
    InboundEvent::Lifecycle(LifecycleSignal {
        message_type: message_type.to_string(),
        event_type: event_type.to_string(),
        kind,
        conversation_id,
        properties: properties.cloned(),
    })
}

/// A text echo sent back to the agent, always tied to the triggering conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub conversation_id: ConversationId,
    pub text: String,
}

impl OutboundReply {
    pub fn echo(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            text: text.into(),
        }
    }

    /// The wire form of this reply.
    pub fn envelope(&self) -> EchoEnvelope<'_> {
        EchoEnvelope {
            message_type: CONVERSATION_MESSAGE_TYPE,
            event_type: ECHO_EVENT,
            conversation_id: &self.conversation_id,
            properties: EchoProperties { text: &self.text },
        }
    }
}

#[derive(Serialize, Debug)]
pub struct EchoEnvelope<'a> {
    pub message_type: &'static str,
    pub event_type: &'static str,
    pub conversation_id: &'a ConversationId,
    pub properties: EchoProperties<'a>,
}

#[derive(Serialize, Debug)]
pub struct EchoProperties<'a> {
    pub text: &'a str,
}
