//! Session task and its handle.
//!
//! A [`Session`] is owned by a single task that multiplexes caller commands and
//! transport signals, so every state change is applied one at a time. Callers talk to
//! it through a cloneable [`SessionHandle`].

use super::{
    events::SessionEvent,
    session::{LifecycleState, Session, SessionError},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 16;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Join(Reply<()>),
    Leave(Reply<()>),
    ToggleScreenShare(Reply<bool>),
    State(oneshot::Sender<LifecycleState>),
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn join(&self) -> Result<(), SessionError> {
        self.request(Command::Join).await
    }

    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(Command::Leave).await
    }

    /// Returns the new screen-share flag.
    pub async fn toggle_screen_share(&self) -> Result<bool, SessionError> {
        self.request(Command::ToggleScreenShare).await
    }

    pub async fn state(&self) -> Result<LifecycleState, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::State(tx))
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }
}

/// Moves `session` onto its own task.
///
/// The task runs until every handle is dropped, then leaves any call still in
/// progress.
pub fn spawn_session(session: Session) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = SessionHandle {
        commands: tx,
        events: session.event_sender(),
    };
    let task = tokio::spawn(run(session, rx));
    (handle, task)
}

async fn run(mut session: Session, mut commands: mpsc::Receiver<Command>) {
    info!("Session task started");
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(command) => apply(&mut session, command).await,
                None => break,
            },
            event = session.next_transport_event() => session.handle_transport_event(event),
        }
    }

    debug!(state = ?session.state(), "All session handles dropped");
    if let Err(e) = session.leave().await {
        warn!(error = %e, "Failed to leave call during shutdown");
    }
    info!("Session task stopped");
}

async fn apply(session: &mut Session, command: Command) {
    // A caller that stopped waiting is not an error for the session.
    match command {
        Command::Join(reply) => {
            let _ = reply.send(session.join().await);
        }
        Command::Leave(reply) => {
            let _ = reply.send(session.leave().await);
        }
        Command::ToggleScreenShare(reply) => {
            let _ = reply.send(session.toggle_screen_share().await);
        }
        Command::State(reply) => {
            let _ = reply.send(session.state());
        }
    }
}
