//! Call Session
//!
//! Everything that happens between "join" and "leave":
//!
//! - `session`: the lifecycle state machine and the per-call state it owns.
//! - `reactions`: classification of side-channel messages and the replies they trigger.
//! - `responder`: sends replies back over the transport.
//! - `events`: what observers of a session get to see.
//! - `runtime`: runs a session on its own task behind a cloneable handle.

pub mod events;
pub mod reactions;
pub mod responder;
pub mod runtime;
pub mod session;

pub use events::{Notice, NoticeLevel, SessionEvent};
pub use runtime::{SessionHandle, spawn_session};
pub use session::{LifecycleState, Session, SessionError};
