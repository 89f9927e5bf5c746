//! Conversation Provisioning
//!
//! Obtaining a joinable conversation takes two sequential HTTP calls: create a persona,
//! then create a conversation for that persona on a replica. The contract is the
//! [`ProvisioningClient`] trait so the session can be driven by a stub in tests; the
//! production implementation is [`TavusClient`].

use crate::persona::PersonaConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{error, info, instrument};

pub const DEFAULT_API_BASE: &str = "https://tavusapi.com/v2";
pub const DEFAULT_REPLICA_ID: &str = "r6583a465c";

const PERSONAS_ENDPOINT: &str = "personas";
const CONVERSATIONS_ENDPOINT: &str = "conversations";
const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConversationRequest {
    pub replica_id: String,
    pub persona_id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PersonaCreated {
    pub persona_id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConversationCreated {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub conversation_url: Option<String>,
}

/// Everything that can go wrong while provisioning a conversation. Always fatal to the
/// join attempt that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("no API credential is configured")]
    MissingCredential,
    #[error("persona document could not be built: {0}")]
    Persona(#[source] serde_json::Error),
    #[error("request to /{endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("/{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[error("/{endpoint} returned `{content_type}` instead of JSON: {snippet}")]
    NotJson {
        endpoint: &'static str,
        content_type: String,
        snippet: String,
    },
    #[error("/{endpoint} returned malformed JSON: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("conversation was created without a conversation URL")]
    MissingConversationUrl,
}

/// The remote persona/conversation provisioning API.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    async fn create_persona(
        &self,
        persona: &PersonaConfig,
    ) -> Result<PersonaCreated, ProvisioningError>;

    async fn create_conversation(
        &self,
        request: &ConversationRequest,
    ) -> Result<ConversationCreated, ProvisioningError>;
}

/// Creates the persona, then a conversation using the returned persona id, and yields
/// the URL to join. Stops at the first failure.
#[instrument(skip_all, fields(replica_id = %replica_id))]
pub async fn provision_conversation(
    client: &dyn ProvisioningClient,
    persona: &PersonaConfig,
    replica_id: &str,
) -> Result<String, ProvisioningError> {
    let created = client.create_persona(persona).await?;
    info!(persona_id = %created.persona_id, "Persona created");

    let conversation = client
        .create_conversation(&ConversationRequest {
            replica_id: replica_id.to_string(),
            persona_id: created.persona_id,
        })
        .await?;

    let url = conversation
        .conversation_url
        .filter(|url| !url.is_empty())
        .ok_or(ProvisioningError::MissingConversationUrl)?;
    info!(
        conversation_id = conversation.conversation_id.as_deref().unwrap_or_default(),
        "Conversation created"
    );
    Ok(url)
}

/// [`ProvisioningClient`] for the Tavus HTTP API.
pub struct TavusClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl TavusClient {
    /// Creates a client for the API rooted at `base_url` (e.g. [`DEFAULT_API_BASE`]).
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    async fn post_json<B, R>(&self, endpoint: &'static str, body: &B) -> Result<R, ProvisioningError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let api_key = self.api_key.expose_secret();
        if api_key.is_empty() {
            return Err(ProvisioningError::MissingCredential);
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|source| ProvisioningError::Request { endpoint, source })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response
            .text()
            .await
            .map_err(|source| ProvisioningError::Request { endpoint, source })?;

        if !status.is_success() {
            error!(endpoint, status = status.as_u16(), "Provisioning request rejected");
            return Err(ProvisioningError::Status {
                endpoint,
                status: status.as_u16(),
                body: text,
            });
        }
        if !content_type.contains("application/json") {
            error!(endpoint, %content_type, "Provisioning response is not JSON");
            return Err(ProvisioningError::NotJson {
                endpoint,
                content_type,
                snippet: text.chars().take(ERROR_SNIPPET_CHARS).collect(),
            });
        }
        serde_json::from_str(&text).map_err(|source| ProvisioningError::Decode { endpoint, source })
    }
}

#[async_trait]
impl ProvisioningClient for TavusClient {
    async fn create_persona(
        &self,
        persona: &PersonaConfig,
    ) -> Result<PersonaCreated, ProvisioningError> {
        self.post_json(PERSONAS_ENDPOINT, persona).await
    }

    async fn create_conversation(
        &self,
        request: &ConversationRequest,
    ) -> Result<ConversationCreated, ProvisioningError> {
        self.post_json(CONVERSATIONS_ENDPOINT, request).await
    }
}
