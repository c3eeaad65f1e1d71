use tokio_util::sync::CancellationToken;

use crate::errors::ClientError;
use crate::remote::{self, Remote};
use crate::structs::{Client, Event, UserProfile};

pub const NO_ATTENDED_EVENTS: &str = "You have not attended any events yet.";
const LOAD_FAILED: &str = "Failed to load profile or attending events.";

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileData {
    pub profile: UserProfile,
    pub events: Vec<Event>,
}

/// The signed-in user's profile and the events they attend.
#[derive(Debug, Default)]
pub struct ProfileView {
    pub state: Remote<ProfileData>,
    cancel: CancellationToken,
}

impl ProfileView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the profile and the attended events concurrently.
    pub async fn load(&mut self, client: &Client) {
        let cancel = Some(&self.cancel);
        let fetch = async {
            let (profile, events) =
                tokio::try_join!(client.profile(cancel), client.attending_events(cancel))?;
            Ok::<_, ClientError>(ProfileData { profile, events })
        };

        if let Some(state) = remote::load(&self.cancel, fetch, LOAD_FAILED).await {
            self.state = state;
        }
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        match &self.state {
            Remote::Ready(data) if data.events.is_empty() => Some(NO_ATTENDED_EVENTS),
            _ => None,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for ProfileView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
