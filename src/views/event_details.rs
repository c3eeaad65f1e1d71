use tokio_util::sync::CancellationToken;

use crate::errors::{ClientError, RequestError};
use crate::navigator::Route;
use crate::remote::{self, Remote};
use crate::structs::{AttendOutcome, Client, Event, Id};

pub const SIGN_IN_NOTICE: &str = "Please sign in to connect.";
const LOAD_FAILED: &str = "Failed to load event.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attendance {
    Attend,
    Unattend,
}

impl Attendance {
    fn changed_notice(self) -> &'static str {
        match self {
            Attendance::Attend => "You're going!",
            Attendance::Unattend => "You left this event.",
        }
    }

    fn conflict_notice(self) -> &'static str {
        match self {
            Attendance::Attend => "Already attending.",
            Attendance::Unattend => "You are not attending this event.",
        }
    }

    fn failure_notice(self) -> &'static str {
        match self {
            Attendance::Attend => "Sorry. Failed to attend.",
            Attendance::Unattend => "Failed to unattend.",
        }
    }
}

/// One event with its attend/unattend action.
#[derive(Debug)]
pub struct EventDetailsView {
    pub event_id: Id,
    pub event: Remote<Event>,
    /// Whether the current user attends, re-derived after every fetch.
    pub attending: bool,
    /// An attend/unattend call is in flight.
    pub saving: bool,
    /// Feedback for the last action, shown next to the button.
    pub notice: Option<String>,
    cancel: CancellationToken,
}

impl EventDetailsView {
    pub fn new(event_id: Id) -> Self {
        Self {
            event_id,
            event: Remote::Loading,
            attending: false,
            saving: false,
            notice: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn route(&self) -> Route {
        Route::EventDetails(self.event_id.clone())
    }

    /// Fetches the event. Also used to re-read it after attend/unattend.
    pub async fn load(&mut self, client: &Client) {
        let fetched = remote::load(
            &self.cancel,
            client.event(&self.event_id, Some(&self.cancel)),
            LOAD_FAILED,
        )
        .await;

        let Some(state) = fetched else {
            return;
        };

        self.attending = state
            .ready()
            .is_some_and(|event| event.is_attended_by(&client.current_session()));
        self.event = state;
    }

    pub async fn attend(&mut self, client: &Client) {
        self.change_attendance(client, Attendance::Attend).await;
    }

    pub async fn unattend(&mut self, client: &Client) {
        self.change_attendance(client, Attendance::Unattend).await;
    }

    /// Label of the action button.
    pub fn action_label(&self) -> &'static str {
        match (self.attending, self.saving) {
            (true, true) => "Leaving…",
            (true, false) => "Unattend",
            (false, true) => "Joining…",
            (false, false) => "Attend",
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn change_attendance(&mut self, client: &Client, action: Attendance) {
        if !client.current_session().is_authenticated() {
            self.notice = Some(SIGN_IN_NOTICE.to_string());
            client
                .navigator()
                .navigate(Route::login(Some(self.route().path())));
            return;
        }

        self.saving = true;
        let result = match action {
            Attendance::Attend => client.attend(&self.event_id).await,
            Attendance::Unattend => client.unattend(&self.event_id).await,
        };

        let refetch = result.is_ok();
        self.notice = Some(match result {
            Ok(AttendOutcome::Changed) => action.changed_notice().to_string(),
            Ok(AttendOutcome::AlreadyInState) => action.conflict_notice().to_string(),
            Err(ClientError::Request(RequestError::AuthExpired)) => SIGN_IN_NOTICE.to_string(),
            Err(err) => {
                log::warn!("Failed to {action:?} event {}: {err}", self.event_id);
                err.user_message(action.failure_notice())
            }
        });

        if refetch {
            self.load(client).await;
        }
        self.saving = false;
    }
}

impl Drop for EventDetailsView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
