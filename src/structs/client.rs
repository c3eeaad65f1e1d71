use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::event::event_list;
use super::{Credentials, Event, Id, NewEvent, NewUser, UserProfile};
use crate::config::ClientOptions;
use crate::errors::{AuthError, ClientError, RequestError};
use crate::gateway::{Gateway, RequestBody, RequestOptions};
use crate::navigator::{BrowserNavigator, Navigator};
use crate::session::{Session, SessionBus, SessionStore};
use crate::storage::{FileStorage, Storage};

/// Result of an attend/unattend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendOutcome {
    Changed,
    /// The backend answered 409: the user was already in the requested state.
    AlreadyInState,
}

/// Shero Hub client. Used to interact with the events API.
pub struct Client {
    pub options: ClientOptions,
    session: Arc<SessionStore>,
    gateway: Gateway,
    navigator: Arc<dyn Navigator>,
}

impl Client {
    /// Creates a client whose session lives in `storage` and syncs over `bus`.
    pub fn new(
        options: ClientOptions,
        storage: Arc<dyn Storage>,
        bus: SessionBus,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        options.validate()?;

        let session = Arc::new(SessionStore::new(storage, bus).with_debug(options.debug));
        let gateway = Gateway::new(&options, Arc::clone(&session), Arc::clone(&navigator))?;

        Ok(Self {
            options,
            session,
            gateway,
            navigator,
        })
    }

    /// Client persisting its session under `options.storage_dir` and opening
    /// views in the system browser.
    pub fn from_options(options: ClientOptions) -> Result<Self, ClientError> {
        let storage = FileStorage::open(&options.storage_dir)?;
        let navigator = BrowserNavigator::new(&options.app_url);

        Self::new(
            options,
            Arc::new(storage),
            SessionBus::new(),
            Arc::new(navigator),
        )
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn current_session(&self) -> Session {
        self.session.current_session()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.session.login(&self.gateway, credentials).await
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub async fn register(&self, user: &NewUser) -> Result<(), ClientError> {
        self.gateway
            .post_json::<_, Value>("/auth/register/", user, RequestOptions::anonymous())
            .await?;
        Ok(())
    }

    pub async fn profile(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<UserProfile, ClientError> {
        let body: Value = self
            .gateway
            .get_json("/auth/profile/", RequestOptions::default().cancel_on(cancel))
            .await?;

        UserProfile::from_profile_body(body).map_err(|err| RequestError::from(err).into())
    }

    pub async fn events(&self, cancel: Option<&CancellationToken>) -> Result<Vec<Event>, ClientError> {
        let body: Value = self
            .gateway
            .get_json("/events/", RequestOptions::cache_busted().cancel_on(cancel))
            .await?;

        event_list(body).map_err(|err| RequestError::from(err).into())
    }

    /// Fetches one event. A 404 is [`ClientError::NotFound`].
    pub async fn event(
        &self,
        id: &Id,
        cancel: Option<&CancellationToken>,
    ) -> Result<Event, ClientError> {
        let path = format!("/events/{}/", urlencoding::encode(id.as_str()));
        let result = self
            .gateway
            .get_json::<Option<Event>>(&path, RequestOptions::cache_busted().cancel_on(cancel))
            .await;

        match result {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(ClientError::NotFound("Event".to_string())),
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                Err(ClientError::NotFound("Event".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Creates an event with a multipart upload. Returns the created event
    /// when the backend echoes it.
    pub async fn create_event(&self, event: NewEvent) -> Result<Option<Event>, ClientError> {
        let response = self
            .gateway
            .request(
                Method::POST,
                "/events/",
                Some(RequestBody::Multipart(event.into_form())),
                RequestOptions::default(),
            )
            .await?;

        Ok(response.json::<Option<Event>>().unwrap_or_else(|err| {
            log::debug!("Event created, but the response was not an event: {err}");
            None
        }))
    }

    pub async fn attend(&self, id: &Id) -> Result<AttendOutcome, ClientError> {
        self.set_attendance(id, "attend").await
    }

    pub async fn unattend(&self, id: &Id) -> Result<AttendOutcome, ClientError> {
        self.set_attendance(id, "unattend").await
    }

    /// Events the signed-in user attends.
    pub async fn attending_events(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Event>, ClientError> {
        let body: Value = self
            .gateway
            .get_json(
                "/api/users/me/events/attending",
                RequestOptions::default().cancel_on(cancel),
            )
            .await?;

        event_list(body).map_err(|err| RequestError::from(err).into())
    }

    async fn set_attendance(&self, id: &Id, action: &str) -> Result<AttendOutcome, ClientError> {
        let path = format!("/events/{}/{action}/", urlencoding::encode(id.as_str()));
        let result = self
            .gateway
            .request(
                Method::POST,
                &path,
                Some(RequestBody::Json(Value::Object(Default::default()))),
                RequestOptions::default(),
            )
            .await;

        match result {
            Ok(_) => Ok(AttendOutcome::Changed),
            Err(err) if err.status() == Some(StatusCode::CONFLICT) => Ok(AttendOutcome::AlreadyInState),
            Err(err) => Err(err.into()),
        }
    }
}
