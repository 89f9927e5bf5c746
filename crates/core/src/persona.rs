//! Persona configuration document sent to the provisioning API.
//!
//! The document configures the remote agent's speech, language-model and perception
//! layers, and advertises the two tools this client answers: `get_skin_cures` on the
//! conversational side and `acne_detected` on the perception side.

use crate::tools::{GET_SKIN_CURES, GetSkinCuresArgs};
use schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde_json::Value;

/// Name of the perception tool raised when acne is visible on the user's face.
pub const ACNE_DETECTED: &str = "acne_detected";

/// Arguments of the `acne_detected` perception tool.
#[derive(JsonSchema, Debug)]
pub struct AcneDetectedArgs {
    /// is acne detected on user's face?
    pub have_acne: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PersonaConfig {
    pub persona_name: String,
    pub pipeline_mode: String,
    pub system_prompt: String,
    pub context: String,
    pub layers: Layers,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Layers {
    pub tts: TtsLayer,
    pub llm: LlmLayer,
    pub perception: PerceptionLayer,
    pub stt: SttLayer,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TtsLayer {
    pub tts_engine: String,
    pub tts_emotion_control: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LlmLayer {
    pub tools: Vec<ToolDefinition>,
    pub model: String,
    pub speculative_inference: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PerceptionLayer {
    pub perception_model: String,
    pub ambient_awareness_queries: Vec<String>,
    pub perception_analysis_queries: Vec<String>,
    pub perception_tool_prompt: String,
    pub perception_tools: Vec<ToolDefinition>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SttLayer {
    pub stt_engine: String,
    pub participant_pause_sensitivity: String,
    pub participant_interrupt_sensitivity: String,
    pub smart_turn_detection: bool,
}

/// An OpenAI-style function tool declaration.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Declares a function tool whose parameters are the JSON schema of `T`.
    pub fn function<T: JsonSchema>(
        name: &str,
        description: &str,
    ) -> Result<Self, serde_json::Error> {
        let mut parameters = serde_json::to_value(schema_for!(T))?;
        if let Some(object) = parameters.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }
        Ok(Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        })
    }
}

impl PersonaConfig {
    /// The skin doctor persona this client is built around.
    pub fn skin_doctor() -> Result<Self, serde_json::Error> {
        Ok(Self {
            persona_name: "Personal Skin Doctor".to_string(),
            pipeline_mode: "full".to_string(),
            system_prompt: "You are a friendly Personal Skin Doctor who know cures to all the disease in the world. In this call, users want to know what are the cures to the user's disease".to_string(),
            context: "User want to know what is the cure to his/her skin problem. When a user says \"What is the cure to X\" or \"What is the solution to X\", you should acknowledge their disease and use the get_skin_cures tool to return the cures of the disease's cures based on user request".to_string(),
            layers: Layers {
                tts: TtsLayer {
                    tts_engine: "cartesia".to_string(),
                    tts_emotion_control: true,
                },
                llm: LlmLayer {
                    tools: vec![ToolDefinition::function::<GetSkinCuresArgs>(
                        GET_SKIN_CURES,
                        "Record the user's disease",
                    )?],
                    model: "tavus-llama".to_string(),
                    speculative_inference: true,
                },
                perception: PerceptionLayer {
                    perception_model: "raven-0".to_string(),
                    ambient_awareness_queries: vec![
                        "Is the user have an acne in his or her face?".to_string(),
                        "Does the user appear distressed or uncomfortable?".to_string(),
                    ],
                    perception_analysis_queries: vec![
                        "Is the user wearing an outfit with dark colors?".to_string(),
                        "Is the user male?".to_string(),
                    ],
                    perception_tool_prompt: format!(
                        "You have a tool to notify the system when an acne is detected on user face, named `{ACNE_DETECTED}`. You MUST use this tool when an acne is detected on user face."
                    ),
                    perception_tools: vec![ToolDefinition::function::<AcneDetectedArgs>(
                        ACNE_DETECTED,
                        "Use this function when acne is detected in the image with high confidence",
                    )?],
                },
                stt: SttLayer {
                    stt_engine: "tavus-advanced".to_string(),
                    participant_pause_sensitivity: "high".to_string(),
                    participant_interrupt_sensitivity: "high".to_string(),
                    smart_turn_detection: true,
                },
            },
        })
    }
}
