use crate::forms::EventForm;
use crate::navigator::Route;
use crate::structs::Client;

const CREATE_FAILED: &str = "Failed to create event.";

/// The "new event" form page.
#[derive(Debug, Default)]
pub struct CreateEventView {
    pub error: Option<String>,
    pub submitting: bool,
}

impl CreateEventView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads the event and moves to the event listing. On failure the error
    /// is kept and the caller still owns a copy of the form.
    pub async fn submit(&mut self, client: &Client, form: EventForm) {
        self.error = None;

        let event = match form.into_new_event().await {
            Ok(event) => event,
            Err(err) => {
                self.error = Some(err.to_string());
                return;
            }
        };

        self.submitting = true;
        let result = client.create_event(event).await;
        self.submitting = false;

        match result {
            Ok(_) => client.navigator().navigate(Route::Events),
            Err(err) => {
                log::warn!("Failed to create event: {err}");
                self.error = Some(err.user_message(CREATE_FAILED));
            }
        }
    }
}
