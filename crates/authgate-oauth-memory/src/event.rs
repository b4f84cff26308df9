//! Event recording.

use async_trait::async_trait;
use authgate_oauth::OAuthResult;
use authgate_oauth::services::{AuthEvent, EventService};
use tokio::sync::RwLock;

/// Keeps dispatched events in order.
#[derive(Debug, Default)]
pub struct RecordingEventService {
    events: RwLock<Vec<AuthEvent>>,
}

impl RecordingEventService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event dispatched so far.
    pub async fn events(&self) -> Vec<AuthEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventService for RecordingEventService {
    async fn dispatch_event(&self, event: AuthEvent) -> OAuthResult<()> {
        tracing::debug!(?event, "event dispatched");
        self.events.write().await.push(event);
        Ok(())
    }
}
