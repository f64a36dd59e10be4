//! Shared application state.

use crate::hub::Hub;

/// Shared application state
pub struct AppState {
    /// Running hub (server hub + persistence relay)
    pub hub: Hub,
}
