//! Shared Session Dependencies
//!
//! This module defines the `AppState` struct, which holds the collaborators and
//! configuration a session is built from.

use crate::{config::Config, transport::CallTransport};
use skin_doctor_core::provisioning::ProvisioningClient;
use std::sync::Arc;

/// Created once and handed to every session.
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn CallTransport>,
    pub provisioning: Arc<dyn ProvisioningClient>,
    pub config: Arc<Config>,
}
