//! Tool Dispatcher
//!
//! Resolves tool invocations raised by the conversational agent into echo replies.
//! Lookups are deterministic: the only tool, `get_skin_cures`, maps a normalized
//! skin condition onto a fixed remedy table.

use crate::protocol::{OutboundReply, ToolCallEvent};
use schemars::JsonSchema;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info};

/// Name of the conversational tool that looks up a remedy.
pub const GET_SKIN_CURES: &str = "get_skin_cures";

/// Remedy text used for conditions missing from the table, unless configured otherwise.
pub const DEFAULT_FALLBACK_REMEDY: &str = "consult a dermatologist for a proper diagnosis";

const REMEDIES: [(&str, &str); 6] = [
    (
        "pimples",
        "Use a mild cleanser, avoid touching your face, and apply a benzoyl peroxide cream",
    ),
    (
        "sunburn",
        "Apply aloe vera or a cooling moisturizer, and stay out of the sun",
    ),
    (
        "wrinkles",
        "Use sunscreen daily, moisturize, and avoid smoking or tanning",
    ),
    (
        "oilyskin",
        "Use oil-free products, gentle cleansers, and don't overwash your face",
    ),
    (
        "darkspot",
        "Try topical treatments like vitamin C, retinoids, or consult for chemical peels",
    ),
    (
        "dryskin",
        "Moisturize regularly, use gentle cleansers, and avoid hot showers",
    ),
];

/// Arguments of the `get_skin_cures` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct GetSkinCuresArgs {
    /// The disease which the user wanted to know how to cure
    pub disease: String,
}

/// Failure to interpret the arguments of a tool call.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool `{0}` was called without arguments")]
    MissingArguments(String),
    #[error("tool `{tool}` received arguments that are not valid JSON: {source}")]
    InvalidJson {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool `{tool}` received arguments that do not match its parameters: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What to answer when a condition is not in the remedy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownConditionPolicy {
    /// Reply with this remedy text in place of a table entry.
    Fallback(String),
    /// Send nothing.
    Suppress,
}

impl Default for UnknownConditionPolicy {
    fn default() -> Self {
        Self::Fallback(DEFAULT_FALLBACK_REMEDY.to_string())
    }
}

/// Trims and case-folds a free-text condition into a remedy table key.
pub fn normalize_condition(disease: &str) -> String {
    disease.trim().to_lowercase()
}

/// Looks up the remedy for an already normalized condition key.
pub fn remedy_for(key: &str) -> Option<&'static str> {
    REMEDIES
        .iter()
        .find(|(condition, _)| *condition == key)
        .map(|(_, remedy)| *remedy)
}

fn remedy_text(disease: &str, remedy: &str) -> String {
    format!("If you're getting {disease} I suggest to {remedy}.")
}

/// Accepts arguments either as a JSON-encoded string or as an inline object.
fn parse_arguments<T: DeserializeOwned>(tool: &str, raw: &Value) -> Result<T, ToolError> {
    let value = match raw {
        Value::Null => return Err(ToolError::MissingArguments(tool.to_string())),
        Value::String(encoded) => {
            serde_json::from_str::<Value>(encoded).map_err(|source| ToolError::InvalidJson {
                tool: tool.to_string(),
                source,
            })?
        }
        inline => inline.clone(),
    };
    serde_json::from_value(value).map_err(|source| ToolError::InvalidArguments {
        tool: tool.to_string(),
        source,
    })
}

/// Maps tool calls onto their reply generators.
#[derive(Debug, Clone, Default)]
pub struct ToolDispatcher {
    unknown_condition: UnknownConditionPolicy,
}

impl ToolDispatcher {
    pub fn new(unknown_condition: UnknownConditionPolicy) -> Self {
        Self { unknown_condition }
    }

    /// Resolves a tool call into the reply to send, if any.
    ///
    /// `Ok(None)` means the call was understood but produces no reply: either the
    /// tool is not one this client handles, or the condition is unknown and the
    /// policy is [`UnknownConditionPolicy::Suppress`].
    pub fn dispatch(&self, call: &ToolCallEvent) -> Result<Option<OutboundReply>, ToolError> {
        match call.name.as_str() {
            GET_SKIN_CURES => self.get_skin_cures(call),
            other => {
                debug!(tool = %other, "No handler registered for tool call");
                Ok(None)
            }
        }
    }

    fn get_skin_cures(&self, call: &ToolCallEvent) -> Result<Option<OutboundReply>, ToolError> {
        let args: GetSkinCuresArgs = parse_arguments(GET_SKIN_CURES, &call.raw_arguments)?;
        let key = normalize_condition(&args.disease);
        info!(tool = GET_SKIN_CURES, condition = %key, "Executing tool");

        let remedy = match (remedy_for(&key), &self.unknown_condition) {
            (Some(remedy), _) => remedy,
            (None, UnknownConditionPolicy::Fallback(fallback)) => fallback.as_str(),
            (None, UnknownConditionPolicy::Suppress) => {
                info!(condition = %key, "Unknown condition; reply suppressed");
                return Ok(None);
            }
        };

        Ok(Some(OutboundReply::echo(
            call.conversation_id.clone(),
            remedy_text(&args.disease, remedy),
        )))
    }
}
