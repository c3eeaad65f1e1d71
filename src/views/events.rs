use tokio_util::sync::CancellationToken;

use crate::remote::{self, Remote};
use crate::structs::{Client, Event};

pub const NO_EVENTS: &str = "No events found.";
const LOAD_FAILED: &str = "Failed to load events.";

/// The event listing.
#[derive(Debug, Default)]
pub struct EventsView {
    pub events: Remote<Vec<Event>>,
    cancel: CancellationToken,
}

impl EventsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, client: &Client) {
        let fetched = remote::load(&self.cancel, client.events(Some(&self.cancel)), LOAD_FAILED).await;
        if let Some(state) = fetched {
            self.events = state;
        }
    }

    /// Message to show instead of an empty list.
    pub fn empty_message(&self) -> Option<&'static str> {
        match &self.events {
            Remote::Ready(events) if events.is_empty() => Some(NO_EVENTS),
            _ => None,
        }
    }

    /// Handle that tears the pending fetch down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for EventsView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
