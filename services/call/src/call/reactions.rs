//! Reactions to side-channel messages.
//!
//! Every inbound envelope is classified, then:
//! - tool calls go through the [`ToolDispatcher`] and the reply is sent straight away;
//! - perception tool calls with a registered reaction go through that reaction's
//!   [`CooldownGate`] before the fixed reply is sent;
//! - everything else is only reported.

use super::responder::Responder;
use crate::config::Config;
use skin_doctor_core::{
    cooldown::{CooldownGate, Rejection},
    persona::ACNE_DETECTED,
    protocol::{InboundEvent, OutboundReply, PerceptionToolCallEvent, ToolCallEvent, classify},
    tools::ToolDispatcher,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

const ACNE_REPLY: &str = "I notice that you have acne on your face. I suggest using topical antibiotics like clindamycin and erythromycin.";

/// What happened to one inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionOutcome {
    /// Reported only; nothing to answer.
    Observed,
    /// The envelope or the tool arguments could not be interpreted.
    Malformed(String),
    /// A reply was transmitted.
    Replied(OutboundReply),
    /// The handler decided not to answer.
    NoReply,
    /// The cooldown gate discarded the event.
    Discarded(Rejection),
    /// A reply was built but the transport refused it.
    SendFailed(String),
}

/// A fixed reply guarded by its own cooldown gate.
struct PerceptionReaction {
    gate: CooldownGate,
    reply_text: String,
}

/// The reaction table of one call. Cooldown state lives and dies with it.
pub struct Reactions {
    dispatcher: ToolDispatcher,
    perception: HashMap<String, PerceptionReaction>,
    responder: Responder,
}

impl Reactions {
    pub fn new(config: &Config, responder: Responder) -> Self {
        let mut reactions = Self {
            dispatcher: ToolDispatcher::new(config.unknown_condition.clone()),
            perception: HashMap::new(),
            responder,
        };
        reactions.register_perception(
            CooldownGate::new(ACNE_DETECTED, config.cooldown_window, config.settle_delay),
            ACNE_REPLY,
        );
        reactions
    }

    /// Registers a perception reaction under the gate's name.
    fn register_perception(&mut self, gate: CooldownGate, reply_text: &str) {
        self.perception.insert(
            gate.name().to_string(),
            PerceptionReaction {
                gate,
                reply_text: reply_text.to_string(),
            },
        );
    }

    /// Classifies and reacts to one envelope.
    pub fn handle(&self, envelope: &Value) -> (InboundEvent, ReactionOutcome) {
        let event = classify(envelope);
        let outcome = match &event {
            InboundEvent::Unrecognized(reason) => {
                warn!(%reason, %envelope, "Invalid message structure");
                ReactionOutcome::Malformed(reason.to_string())
            }
            InboundEvent::Lifecycle(signal) => {
                debug!(event_type = %signal.event_type, "Event broadcasted");
                ReactionOutcome::Observed
            }
            InboundEvent::ToolCall(call) => self.on_tool_call(call),
            InboundEvent::PerceptionToolCall(call) => self.on_perception_tool_call(call),
        };
        (event, outcome)
    }

    fn on_tool_call(&self, call: &ToolCallEvent) -> ReactionOutcome {
        match self.dispatcher.dispatch(call) {
            Ok(Some(reply)) => self.transmit(reply),
            Ok(None) => ReactionOutcome::NoReply,
            Err(e) => {
                warn!(tool = %call.name, conversation_id = %call.conversation_id, error = %e, "Error in processing tool call");
                ReactionOutcome::Malformed(e.to_string())
            }
        }
    }

    fn on_perception_tool_call(&self, call: &PerceptionToolCallEvent) -> ReactionOutcome {
        let Some(reaction) = self.perception.get(&call.name) else {
            debug!(tool = %call.name, "No reaction registered for perception tool call");
            return ReactionOutcome::NoReply;
        };

        // Acquired before anything can suspend; released on every path below.
        let permit = match reaction.gate.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => {
                trace!(tool = %call.name, ?rejection, "Perception tool call discarded");
                return ReactionOutcome::Discarded(rejection);
            }
        };

        let reply = OutboundReply::echo(call.conversation_id.clone(), reaction.reply_text.as_str());
        let outcome = self.transmit(reply);
        if matches!(outcome, ReactionOutcome::Replied(_)) {
            permit.release_after_settle();
        }
        outcome
    }

    fn transmit(&self, reply: OutboundReply) -> ReactionOutcome {
        match self.responder.send(&reply) {
            Ok(()) => ReactionOutcome::Replied(reply),
            Err(e) => ReactionOutcome::SendFailed(e.to_string()),
        }
    }
}
