//! Participant roster and track binding.
//!
//! The transport reports participants as snapshots keyed by id. The roster splits them
//! into the single local endpoint and the remote ones, and decides which of each
//! participant's tracks a renderer should bind.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Transport id under which the local endpoint is reported.
pub const LOCAL_PARTICIPANT_ID: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Camera,
    Screen,
    Audio,
}

/// Opaque handle to a transport media track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "handle", rename_all = "lowercase")]
pub enum TrackState {
    Unplayable,
    Playable(MediaHandle),
}

impl TrackState {
    pub fn playable_handle(&self) -> Option<&MediaHandle> {
        match self {
            TrackState::Playable(handle) => Some(handle),
            TrackState::Unplayable => None,
        }
    }
}

/// What the transport reports for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub user_name: Option<String>,
    /// Set by transports that flag the local endpoint instead of using the `"local"` id.
    pub local: bool,
    pub tracks: HashMap<TrackKind, TrackState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub role: ParticipantRole,
    pub user_name: Option<String>,
    pub tracks: HashMap<TrackKind, TrackState>,
}

impl Participant {
    fn from_snapshot(id: String, role: ParticipantRole, snapshot: ParticipantSnapshot) -> Self {
        Self {
            id,
            role,
            user_name: snapshot.user_name,
            tracks: snapshot.tracks,
        }
    }

    fn playable(&self, kind: TrackKind) -> Option<&MediaHandle> {
        self.tracks.get(&kind).and_then(TrackState::playable_handle)
    }

    pub fn is_sharing_screen(&self) -> bool {
        self.playable(TrackKind::Screen).is_some()
    }

    /// Screen share wins over camera; nothing when neither is playable.
    pub fn video_binding(&self) -> Option<(TrackKind, &MediaHandle)> {
        [TrackKind::Screen, TrackKind::Camera]
            .into_iter()
            .find_map(|kind| self.playable(kind).map(|handle| (kind, handle)))
    }

    pub fn audio_binding(&self) -> Option<&MediaHandle> {
        self.playable(TrackKind::Audio)
    }

    pub fn label(&self) -> String {
        match self.role {
            ParticipantRole::Local if self.is_sharing_screen() => "Your Screen".to_string(),
            ParticipantRole::Local => "You".to_string(),
            ParticipantRole::Remote => match &self.user_name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => {
                    let chars: Vec<char> = self.id.chars().collect();
                    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
                    format!("Doctor {tail}")
                }
            },
        }
    }
}

/// The connected participants of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    local: Option<Participant>,
    remote: BTreeMap<String, Participant>,
}

impl Roster {
    pub fn from_snapshots(snapshots: HashMap<String, ParticipantSnapshot>) -> Self {
        let mut roster = Self::default();
        // Sorted so that the `"local"` id is preferred deterministically over a flagged one.
        let mut entries: Vec<_> = snapshots.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| {
            (a != LOCAL_PARTICIPANT_ID)
                .cmp(&(b != LOCAL_PARTICIPANT_ID))
                .then_with(|| a.cmp(b))
        });

        for (id, snapshot) in entries {
            let is_local = id == LOCAL_PARTICIPANT_ID || snapshot.local;
            if !is_local {
                let participant = Participant::from_snapshot(id.clone(), ParticipantRole::Remote, snapshot);
                roster.remote.insert(id, participant);
            } else if roster.local.is_some() {
                warn!(participant_id = %id, "Ignoring second local participant in roster snapshot");
            } else {
                roster.local = Some(Participant::from_snapshot(id, ParticipantRole::Local, snapshot));
            }
        }
        roster
    }

    pub fn local(&self) -> Option<&Participant> {
        self.local.as_ref()
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Participant> {
        self.remote.values()
    }

    pub fn remote(&self, id: &str) -> Option<&Participant> {
        self.remote.get(id)
    }

    pub fn len(&self) -> usize {
        self.remote.len() + usize::from(self.local.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn local_is_sharing_screen(&self) -> bool {
        self.local.as_ref().is_some_and(Participant::is_sharing_screen)
    }
}
