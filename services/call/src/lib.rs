//! Skin Doctor Call Library Crate
//!
//! Drives one video call with the AI skin doctor on top of a [`transport::CallTransport`]:
//! provisioning the conversation, the session lifecycle, roster tracking, and the
//! replies to tool and perception calls. The `provision` binary is a thin wrapper
//! around the provisioning half.

pub mod call;
pub mod config;
pub mod state;
pub mod transport;

#[cfg(test)]
mod test_support;
