//! Events a session publishes to its observers.
//!
//! Observers (a UI, a log sink, a test) subscribe through a broadcast channel and only
//! ever read: nothing here flows back into the session.

use super::session::LifecycleState;
use skin_doctor_core::{protocol::InboundEvent, roster::Roster};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Neutral,
    Success,
    Failed,
}

/// A short, user-facing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn neutral(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Neutral,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Failed,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LifecycleChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    RosterChanged(Roster),
    ScreenShareChanged(bool),
    Notice(Notice),
    /// A classified side-channel event, after any reaction to it has run.
    EventObserved(InboundEvent),
}
