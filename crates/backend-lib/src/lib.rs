// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the TempleMeet meeting gateway.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod meeting;
pub mod meeting_actor;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod storage;
pub mod validation;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::gateway::Gateway;
use crate::middleware::RateLimiter;
use crate::registry::MeetingRegistry;
use crate::storage::Storage;

pub use router::create_router;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<MeetingRegistry>,
    pub gateway: Arc<Gateway>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create a new application state
    pub fn new(storage: Arc<dyn Storage>, settings: Settings) -> Self {
        let registry = Arc::new(MeetingRegistry::new(storage, settings.relay_capacity));
        let gateway = Arc::new(Gateway::new(registry.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(settings.rate_limit.window_secs),
            settings.rate_limit.max_requests,
        ));

        Self {
            settings: Arc::new(settings),
            registry,
            gateway,
            rate_limiter,
        }
    }
}
