//! The single chokepoint for HTTP calls to the backend.
//!
//! Attaches the session's bearer token, and centralizes 401 handling: an
//! unauthorized answer clears the session and sends the navigator to the
//! login view before the caller gets [`RequestError::AuthExpired`].

use std::future::Future;
use std::sync::Arc;

use log::{debug, warn};
use reqwest::multipart::Form;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ClientOptions;
use crate::errors::RequestError;
use crate::navigator::{Navigator, Route};
use crate::session::SessionStore;

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Send no bearer token and treat 401 as an ordinary HTTP error.
    /// Used by the sign-in and sign-up calls.
    pub anonymous: bool,
    /// Append `_=<unix millis>` to GET requests so caches are bypassed.
    pub cache_bust: bool,
    /// Abandon the request as soon as this token is cancelled.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Default::default()
        }
    }

    pub fn cache_busted() -> Self {
        Self {
            cache_bust: true,
            ..Default::default()
        }
    }

    pub fn cancel_on(mut self, cancel: Option<&CancellationToken>) -> Self {
        self.cancel = cancel.cloned();
        self
    }
}

#[derive(Debug)]
pub enum RequestBody {
    Json(Value),
    Multipart(Form),
}

/// A 2xx response with its body read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decodes the body. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        let body = match self.body.trim() {
            "" => "null",
            body => body,
        };
        Ok(serde_json::from_str(body)?)
    }
}

pub struct Gateway {
    http: reqwest::Client,
    api_url: String,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl Gateway {
    pub fn new(
        options: &ClientOptions,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            http,
            api_url: options.api_url.trim_end_matches('/').to_string(),
            session,
            navigator,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Sends one request.
    ///
    /// Non-2xx statuses come back as [`RequestError::Http`] untouched, except
    /// 401 on a non-anonymous call, which becomes [`RequestError::AuthExpired`]
    /// after the session was cleared and the login view requested.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<ApiResponse, RequestError> {
        let cancel = options.cancel.as_ref();
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(RequestError::Cancelled);
        }

        let url = self.url(path, options.cache_bust && method == Method::GET)?;
        let mut builder = self.http.request(method.clone(), url);

        let sent_token = if options.anonymous {
            None
        } else {
            self.session.current_session().token().map(str::to_string)
        };
        if let Some(token) = &sent_token {
            builder = builder.bearer_auth(token);
        }

        builder = match body {
            Some(RequestBody::Json(json)) => builder.json(&json),
            Some(RequestBody::Multipart(form)) => builder.multipart(form),
            None => builder,
        };

        debug!("{method} {path}");
        let response = cancellable(cancel, builder.send()).await??;
        let status = response.status();
        debug!("{method} {path} -> {status}");

        // 401 is handled on the status line alone; its body may never arrive.
        if status == StatusCode::UNAUTHORIZED && !options.anonymous {
            self.handle_unauthorized(sent_token.as_deref());
            return Err(RequestError::AuthExpired);
        }

        let body = cancellable(cancel, response.text()).await??;

        if !status.is_success() {
            return Err(RequestError::Http { status, body });
        }

        Ok(ApiResponse { status, body })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        self.request(Method::GET, path, None, options).await?.json()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        let body = RequestBody::Json(serde_json::to_value(body)?);
        self.request(Method::POST, path, Some(body), options)
            .await?
            .json()
    }

    fn handle_unauthorized(&self, sent_token: Option<&str>) {
        let return_to = self.navigator.current_location();

        match sent_token {
            Some(token) => {
                if self.session.expire(token) {
                    self.navigator.navigate(Route::login(return_to));
                }
            }
            None if !self.session.current_session().is_authenticated() => {
                warn!("Unauthorized without a session, sending the user to sign in");
                self.navigator.navigate(Route::login(return_to));
            }
            // A sign-in landed while this request was in flight.
            None => {}
        }
    }

    fn url(&self, path: &str, cache_bust: bool) -> Result<Url, RequestError> {
        // Append a / to path if it does not start with one
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let mut url = Url::parse(&format!("{}{}", self.api_url, path))
            .map_err(|err| RequestError::InvalidUrl(err.to_string()))?;

        if cache_bust {
            let now = chrono::Utc::now().timestamp_millis().to_string();
            url.query_pairs_mut().append_pair("_", &now);
        }

        Ok(url)
    }
}

async fn cancellable<F: Future>(
    cancel: Option<&CancellationToken>,
    future: F,
) -> Result<F::Output, RequestError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(RequestError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::MemoryNavigator;
    use crate::session::SessionBus;
    use crate::storage::MemoryStorage;

    fn gateway(api_url: &str) -> Gateway {
        let options = ClientOptions {
            api_url: api_url.to_string(),
            ..Default::default()
        };
        let session = Arc::new(SessionStore::new(
            Arc::new(MemoryStorage::new()),
            SessionBus::new(),
        ));
        Gateway::new(&options, session, Arc::new(MemoryNavigator::new())).unwrap()
    }

    #[test]
    fn joins_paths_onto_the_api_base() {
        let gateway = gateway("http://localhost:8000/api/");

        assert_eq!(
            gateway.url("events/", false).unwrap().as_str(),
            "http://localhost:8000/api/events/"
        );
        assert_eq!(
            gateway.url("/auth/login/", false).unwrap().as_str(),
            "http://localhost:8000/api/auth/login/"
        );
    }

    #[test]
    fn cache_busting_adds_a_timestamp_param() {
        let url = gateway("http://localhost:8000").url("/events/", true).unwrap();
        let (key, value) = url.query_pairs().next().unwrap();

        assert_eq!(key, "_");
        assert!(value.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let response = ApiResponse {
            status: StatusCode::NO_CONTENT,
            body: String::new(),
        };
        assert_eq!(response.json::<Option<Value>>().unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_before_sending_never_leaves() {
        let token = CancellationToken::new();
        token.cancel();

        // Nothing listens on this port; a sent request would be a Network error.
        let result = gateway("http://127.0.0.1:9")
            .request(
                Method::GET,
                "/events/",
                None,
                RequestOptions::default().cancel_on(Some(&token)),
            )
            .await;

        assert!(matches!(result, Err(RequestError::Cancelled)));
    }
}
