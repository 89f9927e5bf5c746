//! Session State Machine
//!
//! Owns the lifecycle of one call slot: `Idle → Connecting → Joined → Left`, with
//! `Errored` reachable from provisioning, `Connecting` and `Joined`. Everything that
//! only exists during a call (conversation URL, roster, screen-share flag, reaction
//! cooldowns, the tracing span) lives in an [`ActiveCall`] that is built on join and
//! dropped on every exit, so the next call always starts from fresh state.

use super::{
    events::{Notice, SessionEvent},
    reactions::{ReactionOutcome, Reactions},
    responder::Responder,
};
use crate::{
    state::AppState,
    transport::{TransportError, TransportEvent, TransportEvents},
};
use serde_json::Value;
use skin_doctor_core::{
    persona::PersonaConfig,
    protocol::InboundEvent,
    provisioning::{ProvisioningError, provision_conversation},
    roster::Roster,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, instrument, trace, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;
const SUBSCRIPTION_CLOSED: &str = "event subscription closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Joined,
    Left,
    Errored,
}

impl LifecycleState {
    /// `true` while a call exists, i.e. while a conversation URL is held.
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Connecting | LifecycleState::Joined)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to create call: {0}")]
    Provisioning(#[from] ProvisioningError),
    #[error("connection failed: {0}")]
    Connection(#[source] TransportError),
    #[error("screen share failed: {0}")]
    Media(#[source] TransportError),
    #[error("cannot {command} while {state:?}")]
    InvalidState {
        command: &'static str,
        state: LifecycleState,
    },
    #[error("session task has stopped")]
    Stopped,
}

/// State that exists only while connecting to or joined in a call.
struct ActiveCall {
    conversation_url: String,
    roster: Roster,
    is_screen_sharing: bool,
    reactions: Reactions,
    span: tracing::Span,
}

pub struct Session {
    app: Arc<AppState>,
    lifecycle: LifecycleState,
    call: Option<ActiveCall>,
    subscription: Option<TransportEvents>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(app: Arc<AppState>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            app,
            lifecycle: LifecycleState::Idle,
            call: None,
            subscription: None,
            events,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn conversation_url(&self) -> Option<&str> {
        self.call.as_ref().map(|call| call.conversation_url.as_str())
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.call.as_ref().map(|call| &call.roster)
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.call.as_ref().is_some_and(|call| call.is_screen_sharing)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Provisions a conversation and joins it.
    ///
    /// Allowed from `Idle`, `Left` and `Errored`. A provisioning failure moves straight
    /// to `Errored` without ever holding a conversation URL.
    #[instrument(name = "session_join", skip(self), fields(from = ?self.lifecycle))]
    pub async fn join(&mut self) -> Result<(), SessionError> {
        if self.lifecycle.is_active() {
            return Err(SessionError::InvalidState {
                command: "join",
                state: self.lifecycle,
            });
        }

        self.notify(Notice::neutral("Creating call..."));
        let url = match self.provision().await {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Failed to create call");
                let message = match e {
                    ProvisioningError::MissingConversationUrl => "Failed to get conversation URL",
                    _ => "Failed to create call",
                };
                self.notify(Notice::failed(message));
                self.transition(LifecycleState::Errored);
                return Err(e.into());
            }
        };

        self.notify(Notice::neutral("Joining conversation..."));
        self.attach_events();
        let call_id = Uuid::new_v4();
        self.call = Some(ActiveCall {
            span: info_span!("call", %call_id, conversation_url = %url),
            conversation_url: url.clone(),
            roster: Roster::default(),
            is_screen_sharing: false,
            reactions: Reactions::new(
                &self.app.config,
                Responder::new(self.app.transport.clone()),
            ),
        });
        self.transition(LifecycleState::Connecting);

        info!(url = %url, "Joining meeting");
        match self
            .app
            .transport
            .join(&url, &self.app.config.display_name)
            .await
        {
            Ok(()) => {
                self.confirm_joined();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to join conversation");
                self.teardown(LifecycleState::Errored);
                self.notify(Notice::failed("Failed to connect"));
                Err(SessionError::Connection(e))
            }
        }
    }

    async fn provision(&self) -> Result<String, ProvisioningError> {
        let persona = PersonaConfig::skin_doctor().map_err(ProvisioningError::Persona)?;
        provision_conversation(
            self.app.provisioning.as_ref(),
            &persona,
            &self.app.config.replica_id,
        )
        .await
    }

    /// Leaves the call. A no-op when there is no call.
    #[instrument(name = "session_leave", skip(self), fields(from = ?self.lifecycle))]
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        if !self.lifecycle.is_active() {
            debug!("Not in a call; nothing to leave");
            return Ok(());
        }

        self.detach_events();
        match self.app.transport.leave().await {
            Ok(()) => {
                self.teardown(LifecycleState::Left);
                self.notify(Notice::neutral("Disconnected"));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to leave call");
                self.teardown(LifecycleState::Errored);
                self.notify(Notice::failed("Connection error"));
                Err(SessionError::Connection(e))
            }
        }
    }

    /// Starts or stops sharing the screen; returns the new sharing flag.
    ///
    /// Only valid while `Joined`. On failure the flag is left as it was.
    #[instrument(name = "session_toggle_screen_share", skip(self))]
    pub async fn toggle_screen_share(&mut self) -> Result<bool, SessionError> {
        if self.lifecycle != LifecycleState::Joined {
            return Err(SessionError::InvalidState {
                command: "toggle screen share",
                state: self.lifecycle,
            });
        }

        let sharing = self.is_screen_sharing();
        let result = if sharing {
            self.app.transport.stop_screen_share().await
        } else {
            self.app.transport.start_screen_share().await
        };
        let verb = if sharing { "stop" } else { "start" };

        match result {
            Ok(()) => {
                self.set_screen_sharing(!sharing);
                let message = if sharing {
                    "Screen sharing stopped"
                } else {
                    "Screen sharing started"
                };
                self.notify(Notice::success(message));
                Ok(!sharing)
            }
            Err(e) => {
                warn!(error = %e, "Error trying to {verb} screen share");
                self.notify(Notice::failed(format!(
                    "Failed to {verb} screen sharing: {e}"
                )));
                Err(SessionError::Media(e))
            }
        }
    }

    /// Waits for the next event of the attached subscription; never resolves while
    /// detached.
    ///
    /// A subscription that closes during a call surfaces as a transport error, so the
    /// call is torn down instead of silently going deaf.
    pub async fn next_transport_event(&mut self) -> TransportEvent {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return std::future::pending().await;
            };
            match subscription.recv().await {
                Some(event) => return event,
                None => {
                    warn!(state = ?self.lifecycle, "Transport closed the event subscription");
                    self.subscription = None;
                    if self.lifecycle.is_active() {
                        return TransportEvent::Error(SUBSCRIPTION_CLOSED.to_string());
                    }
                }
            }
        }
    }

    /// Applies one transport signal. Signals arriving outside a call are dropped.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if !self.lifecycle.is_active() {
            trace!(?event, state = ?self.lifecycle, "Ignoring transport event outside a call");
            return;
        }

        match event {
            TransportEvent::ParticipantJoined { .. }
            | TransportEvent::ParticipantUpdated { .. }
            | TransportEvent::ParticipantLeft { .. } => self.refresh_roster(),
            TransportEvent::AppMessage(envelope) => self.handle_app_message(&envelope),
            TransportEvent::StartedScreenShare => {
                info!("Screen share started");
                self.set_screen_sharing(true);
                self.refresh_roster();
            }
            TransportEvent::StoppedScreenShare => {
                info!("Screen share stopped");
                self.set_screen_sharing(false);
                self.refresh_roster();
            }
            TransportEvent::JoinedMeeting => self.confirm_joined(),
            TransportEvent::LeftMeeting => {
                self.teardown(LifecycleState::Left);
                self.notify(Notice::neutral("Disconnected"));
            }
            TransportEvent::Error(message) => {
                error!(%message, "Call error");
                self.teardown(LifecycleState::Errored);
                self.notify(Notice::failed("Connection error"));
            }
        }
    }

    fn handle_app_message(&mut self, envelope: &Value) {
        let Some(call) = self.call.as_ref() else {
            return;
        };
        let (event, outcome) = {
            let _entered = call.span.enter();
            call.reactions.handle(envelope)
        };

        match &outcome {
            ReactionOutcome::Replied(reply) => {
                debug!(conversation_id = %reply.conversation_id, "Reaction replied");
            }
            ReactionOutcome::SendFailed(reason) => {
                warn!(%reason, "Reaction reply was dropped");
            }
            _ => {}
        }
        if !matches!(event, InboundEvent::Unrecognized(_)) {
            self.emit(SessionEvent::EventObserved(event));
        }
    }

    /// Transport confirmed the join: populate the roster and adopt its share state.
    fn confirm_joined(&mut self) {
        if self.lifecycle == LifecycleState::Connecting {
            self.transition(LifecycleState::Joined);
            self.notify(Notice::success("Connected successfully!"));
        }
        self.refresh_roster();
        let observed = self
            .call
            .as_ref()
            .is_some_and(|call| call.roster.local_is_sharing_screen());
        self.set_screen_sharing(observed);
    }

    fn refresh_roster(&mut self) {
        let roster = Roster::from_snapshots(self.app.transport.participants());
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if call.roster != roster {
            call.roster = roster.clone();
            self.emit(SessionEvent::RosterChanged(roster));
        }
    }

    fn set_screen_sharing(&mut self, sharing: bool) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if call.is_screen_sharing != sharing {
            call.is_screen_sharing = sharing;
            self.emit(SessionEvent::ScreenShareChanged(sharing));
        }
    }

    /// Ends the current call: detaches events, drops all per-call state, and moves to
    /// `to`.
    fn teardown(&mut self, to: LifecycleState) {
        self.detach_events();
        if let Some(call) = self.call.take() {
            if call.is_screen_sharing {
                self.emit(SessionEvent::ScreenShareChanged(false));
            }
            if !call.roster.is_empty() {
                self.emit(SessionEvent::RosterChanged(Roster::default()));
            }
        }
        self.transition(to);
    }

    /// Detaches any previous subscription before attaching a fresh one, so handlers
    /// are never registered twice.
    fn attach_events(&mut self) {
        self.detach_events();
        self.subscription = Some(self.app.transport.subscribe());
    }

    fn detach_events(&mut self) {
        if self.subscription.take().is_some() {
            self.app.transport.unsubscribe_all();
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        let from = self.lifecycle;
        if from == to {
            return;
        }
        self.lifecycle = to;
        info!(?from, ?to, "Session state changed");
        self.emit(SessionEvent::LifecycleChanged { from, to });
    }

    fn notify(&self, notice: Notice) {
        debug!(level = ?notice.level, message = %notice.message, "Status");
        self.emit(SessionEvent::Notice(notice));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; observers are optional.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        call::events::NoticeLevel,
        test_support::{
            CONVERSATION_URL, FakeTransport, MockProvisioner, acne_detected, app_state,
            tool_call, working_provisioner,
        },
    };
    use skin_doctor_core::{
        protocol::ConversationId,
        roster::{MediaHandle, ParticipantSnapshot, TrackKind, TrackState},
    };
    use std::{collections::HashMap, time::Duration};

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn transitions(events: &[SessionEvent]) -> Vec<(LifecycleState, LifecycleState)> {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::LifecycleChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    fn failed_notices(events: &[SessionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Notice(notice) if notice.level == NoticeLevel::Failed => {
                    Some(notice.message.clone())
                }
                _ => None,
            })
            .collect()
    }

    async fn joined_session() -> (Session, Arc<FakeTransport>) {
        let transport = FakeTransport::new();
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));
        session.join().await.unwrap();
        (session, transport)
    }

    fn assert_url_invariant(session: &Session) {
        assert_eq!(
            session.conversation_url().is_some(),
            session.state().is_active(),
            "conversation URL must be held exactly while connecting or joined"
        );
    }

    #[tokio::test]
    async fn test_join_happy_path() {
        let transport = FakeTransport::new();
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));
        let mut rx = session.subscribe();
        assert_url_invariant(&session);

        session.join().await.unwrap();

        assert_eq!(session.state(), LifecycleState::Joined);
        assert_eq!(session.conversation_url(), Some(CONVERSATION_URL));
        assert_url_invariant(&session);
        assert_eq!(
            transport.joined(),
            vec![(CONVERSATION_URL.to_string(), "You".to_string())]
        );
        let roster = session.roster().unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.remote("replica-5f2a").unwrap().label(), "Skin Doctor");
        assert!(!session.is_screen_sharing());

        let events = drain(&mut rx);
        assert_eq!(
            transitions(&events),
            vec![
                (LifecycleState::Idle, LifecycleState::Connecting),
                (LifecycleState::Connecting, LifecycleState::Joined),
            ]
        );
        assert!(events.contains(&SessionEvent::Notice(Notice::success(
            "Connected successfully!"
        ))));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::RosterChanged(_))));
    }

    #[tokio::test]
    async fn test_join_observes_existing_screen_share() {
        let transport = FakeTransport::new();
        let mut local = ParticipantSnapshot::default();
        local.tracks.insert(
            TrackKind::Screen,
            TrackState::Playable(MediaHandle("screen".into())),
        );
        transport.set_participants(HashMap::from([("local".to_string(), local)]));
        let mut session = Session::new(app_state(transport, working_provisioner()));

        session.join().await.unwrap();

        assert!(session.is_screen_sharing());
    }

    #[tokio::test]
    async fn test_persona_http_500_never_reaches_joined() {
        let transport = FakeTransport::new();
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_create_persona().times(1).returning(|_| {
            Err(ProvisioningError::Status {
                endpoint: "personas",
                status: 500,
                body: "internal".into(),
            })
        });
        provisioner.expect_create_conversation().never();
        let mut session = Session::new(app_state(transport.clone(), provisioner));
        let mut rx = session.subscribe();

        let err = session.join().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Provisioning(ProvisioningError::Status { status: 500, .. })
        ));
        assert_eq!(session.state(), LifecycleState::Errored);
        assert_eq!(session.conversation_url(), None);
        assert!(transport.joined().is_empty());
        let events = drain(&mut rx);
        assert_eq!(
            transitions(&events),
            vec![(LifecycleState::Idle, LifecycleState::Errored)]
        );
        assert_eq!(failed_notices(&events), vec!["Failed to create call"]);
    }

    #[tokio::test]
    async fn test_missing_conversation_url_is_reported() {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_create_persona().returning(|_| {
            Ok(skin_doctor_core::provisioning::PersonaCreated {
                persona_id: "p".into(),
            })
        });
        provisioner.expect_create_conversation().returning(|_| {
            Ok(skin_doctor_core::provisioning::ConversationCreated {
                conversation_id: Some("c".into()),
                conversation_url: None,
            })
        });
        let mut session = Session::new(app_state(FakeTransport::new(), provisioner));
        let mut rx = session.subscribe();

        assert!(session.join().await.is_err());

        assert_eq!(session.state(), LifecycleState::Errored);
        assert_eq!(
            failed_notices(&drain(&mut rx)),
            vec!["Failed to get conversation URL"]
        );
    }

    #[tokio::test]
    async fn test_transport_join_failure_errors_and_clears_url() {
        let transport = FakeTransport::new();
        transport.fail_join(TransportError::Connection("room expired".into()));
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));
        let mut rx = session.subscribe();

        let err = session.join().await.unwrap_err();

        assert!(matches!(err, SessionError::Connection(_)));
        assert_eq!(session.state(), LifecycleState::Errored);
        assert_url_invariant(&session);
        assert!(session.roster().is_none());
        let events = drain(&mut rx);
        assert_eq!(
            transitions(&events),
            vec![
                (LifecycleState::Idle, LifecycleState::Connecting),
                (LifecycleState::Connecting, LifecycleState::Errored),
            ]
        );
        assert_eq!(failed_notices(&events), vec!["Failed to connect"]);
    }

    #[tokio::test]
    async fn test_join_rejected_while_in_a_call() {
        let (mut session, transport) = joined_session().await;

        let err = session.join().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::InvalidState {
                command: "join",
                state: LifecycleState::Joined
            }
        ));
        assert_eq!(transport.joined().len(), 1);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let transport = FakeTransport::new();
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));

        session.leave().await.unwrap();
        assert_eq!(session.state(), LifecycleState::Idle);

        session.join().await.unwrap();
        session.leave().await.unwrap();
        assert_eq!(session.state(), LifecycleState::Left);
        session.leave().await.unwrap();
        assert_eq!(session.state(), LifecycleState::Left);

        assert_eq!(transport.leave_calls(), 1);
        assert_url_invariant(&session);
        assert!(session.roster().is_none());
        assert!(!session.is_screen_sharing());
    }

    #[tokio::test]
    async fn test_leave_failure_moves_to_errored() {
        let (mut session, transport) = joined_session().await;
        transport.fail_leave(TransportError::Connection("socket reset".into()));

        assert!(matches!(
            session.leave().await,
            Err(SessionError::Connection(_))
        ));
        assert_eq!(session.state(), LifecycleState::Errored);
        assert_url_invariant(&session);
    }

    #[tokio::test]
    async fn test_left_meeting_signal_clears_call() {
        let (mut session, transport) = joined_session().await;
        session.handle_transport_event(TransportEvent::StartedScreenShare);
        assert!(session.is_screen_sharing());

        session.handle_transport_event(TransportEvent::LeftMeeting);

        assert_eq!(session.state(), LifecycleState::Left);
        assert!(!session.is_screen_sharing());
        assert!(session.roster().is_none());
        assert_url_invariant(&session);
        assert!(!transport.emit(TransportEvent::JoinedMeeting));
    }

    #[tokio::test]
    async fn test_error_signal_then_rejoin() {
        let (mut session, transport) = joined_session().await;
        let mut rx = session.subscribe();

        session.handle_transport_event(TransportEvent::Error("ice failed".into()));
        assert_eq!(session.state(), LifecycleState::Errored);
        assert!(session.roster().is_none());
        assert_eq!(failed_notices(&drain(&mut rx)), vec!["Connection error"]);

        session.join().await.unwrap();
        assert_eq!(session.state(), LifecycleState::Joined);
        assert_eq!(transport.joined().len(), 2);
    }

    #[tokio::test]
    async fn test_events_outside_a_call_are_ignored() {
        let transport = FakeTransport::new();
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));

        session.handle_transport_event(TransportEvent::JoinedMeeting);
        session.handle_transport_event(TransportEvent::AppMessage(tool_call("c", "sunburn")));

        assert_eq!(session.state(), LifecycleState::Idle);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_joined_meeting_after_ack_only_refreshes() {
        let (mut session, transport) = joined_session().await;
        let mut rx = session.subscribe();
        transport.set_participants(HashMap::new());

        session.handle_transport_event(TransportEvent::JoinedMeeting);

        assert_eq!(session.state(), LifecycleState::Joined);
        let events = drain(&mut rx);
        assert!(transitions(&events).is_empty());
        assert_eq!(events, vec![SessionEvent::RosterChanged(Roster::default())]);
    }

    #[tokio::test]
    async fn test_toggle_screen_share() {
        let transport = FakeTransport::new();
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));

        assert!(matches!(
            session.toggle_screen_share().await,
            Err(SessionError::InvalidState { .. })
        ));

        session.join().await.unwrap();
        assert!(session.toggle_screen_share().await.unwrap());
        assert!(session.is_screen_sharing());
        assert!(!session.toggle_screen_share().await.unwrap());
        assert!(!session.is_screen_sharing());
        assert_eq!(transport.screen_share_calls(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_toggle_screen_share_failure_keeps_flag_and_state() {
        let (mut session, transport) = joined_session().await;
        transport.fail_screen_share(TransportError::Media("permission denied".into()));
        let mut rx = session.subscribe();

        let err = session.toggle_screen_share().await.unwrap_err();

        assert!(matches!(err, SessionError::Media(_)));
        assert_eq!(session.state(), LifecycleState::Joined);
        assert!(!session.is_screen_sharing());
        assert_eq!(
            failed_notices(&drain(&mut rx)),
            vec!["Failed to start screen sharing: media error: permission denied"]
        );
    }

    #[tokio::test]
    async fn test_tool_call_reply_round_trip() {
        let (mut session, transport) = joined_session().await;
        let mut rx = session.subscribe();

        session.handle_transport_event(TransportEvent::AppMessage(tool_call("conv-77", "dryskin")));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["conversation_id"], "conv-77");
        assert_eq!(
            sent[0]["properties"]["text"],
            "If you're getting dryskin I suggest to Moisturize regularly, use gentle cleansers, and avoid hot showers."
        );
        let observed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::EventObserved(_)))
            .collect();
        assert_eq!(observed.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_envelope_changes_nothing() {
        let (mut session, transport) = joined_session().await;
        let mut rx = session.subscribe();

        session.handle_transport_event(TransportEvent::AppMessage(serde_json::json!({
            "conversation_id": "c",
            "properties": {"name": "get_skin_cures"}
        })));

        assert_eq!(session.state(), LifecycleState::Joined);
        assert!(transport.sent().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acne_detection_gated_per_window() {
        let (mut session, transport) = joined_session().await;

        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c1")));
        tokio::time::sleep(Duration::from_secs(10)).await;
        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c1")));
        assert_eq!(transport.sent().len(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c2")));
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["conversation_id"], "c1");
        assert_eq!(sent[1]["conversation_id"], "c2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acne_back_to_back_transmits_once() {
        let (mut session, transport) = joined_session().await;

        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c1")));
        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c1")));

        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_during_settle_does_not_leak_into_next_call() {
        let (mut session, transport) = joined_session().await;
        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c1")));

        // Still inside the settle window of the first reply.
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.leave().await.unwrap();
        session.join().await.unwrap();
        session.handle_transport_event(TransportEvent::AppMessage(acne_detected("c2")));

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1]["conversation_id"], "c2");
    }

    #[tokio::test]
    async fn test_closed_subscription_during_call_errors() {
        let (mut session, transport) = joined_session().await;
        let mut rx = session.subscribe();

        transport.close_subscription();
        let event = session.next_transport_event().await;
        assert_eq!(event, TransportEvent::Error(SUBSCRIPTION_CLOSED.to_string()));
        session.handle_transport_event(event);

        assert_eq!(session.state(), LifecycleState::Errored);
        assert_url_invariant(&session);
        assert!(session.roster().is_none());
        let events = drain(&mut rx);
        assert_eq!(
            transitions(&events),
            vec![(LifecycleState::Joined, LifecycleState::Errored)]
        );
        assert_eq!(failed_notices(&events), vec!["Connection error"]);
    }

    #[tokio::test]
    async fn test_subscriptions_are_replaced_not_stacked() {
        let transport = FakeTransport::new();
        let mut session = Session::new(app_state(transport.clone(), working_provisioner()));

        session.join().await.unwrap();
        session.leave().await.unwrap();
        session.join().await.unwrap();

        assert_eq!(transport.subscribe_calls(), 2);
        assert_eq!(transport.unsubscribe_calls(), 1);

        assert!(transport.emit(TransportEvent::AppMessage(tool_call("c-9", "wrinkles"))));
        let event = session.next_transport_event().await;
        session.handle_transport_event(event);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(
            transport.sent()[0]["conversation_id"],
            serde_json::json!(ConversationId::new("c-9"))
        );
    }
}
