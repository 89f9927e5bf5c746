//! Skin Doctor Core
//!
//! Transport-agnostic logic for a video call with an AI skin doctor: the side-channel
//! protocol and its classifier, the tool dispatcher, the cooldown gate for perception
//! reactions, the roster model, and conversation provisioning.

pub mod cooldown;
pub mod persona;
pub mod protocol;
pub mod provisioning;
pub mod roster;
pub mod tools;
