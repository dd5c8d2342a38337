//! `SessionStore` – read-only view of the persisted session settings.

use std::time::Duration;

use kiosk_types::SessionConfig;

pub trait SessionStore: Send + Sync {
    fn target_url(&self) -> String;
    fn heartbeat_interval(&self) -> Duration;
}

impl SessionStore for SessionConfig {
    fn target_url(&self) -> String {
        self.target_url.clone()
    }

    fn heartbeat_interval(&self) -> Duration {
        SessionConfig::heartbeat_interval(self)
    }
}
