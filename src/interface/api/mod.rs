//! API interface implementations

pub mod health_handler;
pub mod media_stream;
pub mod metrics_handler;
pub mod router;

pub use metrics_handler::{detached_handle, init_metrics};
pub use router::build_router;

use crate::application::SessionManager;
use std::sync::Arc;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}
