//! Shared fixtures for the session tests.

use crate::{
    config::Config,
    state::AppState,
    transport::{CallTransport, TransportError, TransportEvent, TransportEvents},
};
use async_trait::async_trait;
use mockall::mock;
use secrecy::SecretString;
use serde_json::{Value, json};
use skin_doctor_core::{
    persona::PersonaConfig,
    provisioning::{
        ConversationCreated, ConversationRequest, PersonaCreated, ProvisioningClient,
        ProvisioningError,
    },
    roster::{MediaHandle, ParticipantSnapshot, TrackKind, TrackState},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;

pub const CONVERSATION_URL: &str = "https://tavus.daily.co/c-test";

mock! {
    pub Provisioner {}

    #[async_trait]
    impl ProvisioningClient for Provisioner {
        async fn create_persona(
            &self,
            persona: &PersonaConfig,
        ) -> Result<PersonaCreated, ProvisioningError>;

        async fn create_conversation(
            &self,
            request: &ConversationRequest,
        ) -> Result<ConversationCreated, ProvisioningError>;
    }
}

/// A provisioner that always hands out [`CONVERSATION_URL`].
pub fn working_provisioner() -> MockProvisioner {
    let mut provisioner = MockProvisioner::new();
    provisioner.expect_create_persona().returning(|_| {
        Ok(PersonaCreated {
            persona_id: "p-test".to_string(),
        })
    });
    provisioner
        .expect_create_conversation()
        .withf(|request| request.persona_id == "p-test" && request.replica_id == "r6583a465c")
        .returning(|_| {
            Ok(ConversationCreated {
                conversation_id: Some("c-test".to_string()),
                conversation_url: Some(CONVERSATION_URL.to_string()),
            })
        });
    provisioner
}

#[derive(Default)]
struct FakeState {
    join_error: Option<TransportError>,
    leave_error: Option<TransportError>,
    screen_share_error: Option<TransportError>,
    send_error: Option<TransportError>,
    participants: HashMap<String, ParticipantSnapshot>,
    subscriber: Option<mpsc::UnboundedSender<TransportEvent>>,
    joined: Vec<(String, String)>,
    sent: Vec<Value>,
    leave_calls: usize,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
    screen_share_calls: Vec<bool>,
}

/// In-memory transport that records every command it receives.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let transport = Arc::new(Self::default());
        let mut local = ParticipantSnapshot::default();
        local.tracks.insert(
            TrackKind::Camera,
            TrackState::Playable(MediaHandle("local-cam".into())),
        );
        let mut replica = ParticipantSnapshot {
            user_name: Some("Skin Doctor".into()),
            ..Default::default()
        };
        replica.tracks.insert(
            TrackKind::Camera,
            TrackState::Playable(MediaHandle("replica-cam".into())),
        );
        transport.set_participants(HashMap::from([
            ("local".to_string(), local),
            ("replica-5f2a".to_string(), replica),
        ]));
        transport
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn fail_join(&self, error: TransportError) {
        self.with(|s| s.join_error = Some(error));
    }

    pub fn fail_leave(&self, error: TransportError) {
        self.with(|s| s.leave_error = Some(error));
    }

    pub fn fail_screen_share(&self, error: TransportError) {
        self.with(|s| s.screen_share_error = Some(error));
    }

    pub fn fail_send(&self, error: Option<TransportError>) {
        self.with(|s| s.send_error = error);
    }

    pub fn set_participants(&self, participants: HashMap<String, ParticipantSnapshot>) {
        self.with(|s| s.participants = participants);
    }

    /// Delivers an event to the live subscription; `false` when nobody is attached.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.with(|s| {
            s.subscriber
                .as_ref()
                .is_some_and(|tx| tx.send(event).is_ok())
        })
    }

    /// Drops the sending side of the live subscription, as a dying transport would.
    pub fn close_subscription(&self) {
        self.with(|s| s.subscriber = None);
    }

    pub fn joined(&self) -> Vec<(String, String)> {
        self.with(|s| s.joined.clone())
    }

    pub fn sent(&self) -> Vec<Value> {
        self.with(|s| s.sent.clone())
    }

    pub fn leave_calls(&self) -> usize {
        self.with(|s| s.leave_calls)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.with(|s| s.subscribe_calls)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.with(|s| s.unsubscribe_calls)
    }

    pub fn screen_share_calls(&self) -> Vec<bool> {
        self.with(|s| s.screen_share_calls.clone())
    }
}

#[async_trait]
impl CallTransport for FakeTransport {
    async fn join(&self, url: &str, display_name: &str) -> Result<(), TransportError> {
        self.with(|s| {
            s.joined.push((url.to_string(), display_name.to_string()));
            s.join_error.clone().map_or(Ok(()), Err)
        })
    }

    async fn leave(&self) -> Result<(), TransportError> {
        self.with(|s| {
            s.leave_calls += 1;
            s.leave_error.clone().map_or(Ok(()), Err)
        })
    }

    async fn start_screen_share(&self) -> Result<(), TransportError> {
        self.with(|s| {
            s.screen_share_calls.push(true);
            s.screen_share_error.clone().map_or(Ok(()), Err)
        })
    }

    async fn stop_screen_share(&self) -> Result<(), TransportError> {
        self.with(|s| {
            s.screen_share_calls.push(false);
            s.screen_share_error.clone().map_or(Ok(()), Err)
        })
    }

    fn participants(&self) -> HashMap<String, ParticipantSnapshot> {
        self.with(|s| s.participants.clone())
    }

    fn send_broadcast_message(&self, payload: Value) -> Result<(), TransportError> {
        self.with(|s| match &s.send_error {
            Some(error) => Err(error.clone()),
            None => {
                s.sent.push(payload);
                Ok(())
            }
        })
    }

    fn subscribe(&self) -> TransportEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with(|s| {
            s.subscribe_calls += 1;
            s.subscriber = Some(tx);
        });
        rx
    }

    fn unsubscribe_all(&self) {
        self.with(|s| {
            s.unsubscribe_calls += 1;
            s.subscriber = None;
        });
    }
}

pub fn app_state(transport: Arc<FakeTransport>, provisioner: MockProvisioner) -> Arc<AppState> {
    Arc::new(AppState {
        transport,
        provisioning: Arc::new(provisioner),
        config: Arc::new(Config::new(SecretString::from("test-key".to_string()))),
    })
}

pub fn tool_call(conversation_id: &str, disease: &str) -> Value {
    json!({
        "message_type": "conversation",
        "event_type": "conversation.tool_call",
        "conversation_id": conversation_id,
        "properties": {
            "name": "get_skin_cures",
            "arguments": json!({ "disease": disease }).to_string()
        }
    })
}

pub fn acne_detected(conversation_id: &str) -> Value {
    json!({
        "message_type": "conversation",
        "event_type": "conversation.perception_tool_call",
        "conversation_id": conversation_id,
        "properties": {
            "name": "acne_detected",
            "arguments": { "have_acne": true }
        }
    })
}
