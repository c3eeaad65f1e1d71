use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the [`Gateway`](crate::gateway::Gateway).
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request never completed (connection refused, DNS failure, timeout...).
    #[error("Failed to send a request to the API.")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-2xx status other than 401.
    /// The caller decides what the status means (409 on attend, 404 on lookup...).
    #[error("The API returned {status}.")]
    Http { status: StatusCode, body: String },

    /// The server answered 401 to an authenticated call.
    /// By the time the caller sees this the session is already cleared and the
    /// navigator already sent to the login view.
    #[error("Your session has expired. Please sign in again.")]
    AuthExpired,

    /// The caller cancelled the request before it finished.
    #[error("The request was cancelled.")]
    Cancelled,

    /// Failed to decode the API response.
    #[error("Failed to decode API response.")]
    FailedToDecode(#[from] serde_json::Error),

    /// The request path could not be turned into a URL.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl RequestError {
    /// Status code of an [`RequestError::Http`] error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `error` or `detail` field of a JSON error body, if the backend sent one.
    pub fn server_message(&self) -> Option<String> {
        let RequestError::Http { body, .. } = self else {
            return None;
        };

        let json: Value = serde_json::from_str(body).ok()?;
        ["error", "detail"]
            .iter()
            .find_map(|key| json.get(key).and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Errors returned by [`SessionStore::login`](crate::session::SessionStore::login).
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend rejected the credentials, or could not be reached.
    #[error("Invalid credentials or server error.")]
    InvalidCredentials,

    /// The login response did not contain an access token.
    #[error("No access token returned from server.")]
    MalformedResponse,

    /// The token could not be written to durable storage.
    #[error("Failed to persist the session: {0}")]
    Storage(#[from] StorageError),
}

/// Durable storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but is not a JSON object of strings.
    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Invalid [`ClientOptions`](crate::config::ClientOptions).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API URL \"{0}\". Must be an absolute http(s) URL.")]
    InvalidApiUrl(String),

    #[error("Invalid app URL \"{0}\". Must be an absolute http(s) URL.")]
    InvalidAppUrl(String),

    #[error("Request timeout must be greater than zero.")]
    InvalidTimeout,
}

/// Umbrella error for the [`Client`](crate::Client) facade and the views.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A client-side form check failed. Never reaches the network.
    #[error("{0}")]
    Validation(String),

    /// The requested entity does not exist.
    #[error("{0} not found.")]
    NotFound(String),
}

impl ClientError {
    /// Text safe to show the user. Backend-provided messages win, then fixed
    /// phrases for the errors that have one, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Validation(message) => message.clone(),
            ClientError::NotFound(_) => self.to_string(),
            ClientError::Auth(AuthError::Storage(_)) => fallback.to_string(),
            ClientError::Auth(err) => err.to_string(),
            ClientError::Request(RequestError::AuthExpired) => {
                RequestError::AuthExpired.to_string()
            }
            ClientError::Request(err) => err
                .server_message()
                .unwrap_or_else(|| fallback.to_string()),
            _ => fallback.to_string(),
        }
    }

    /// Whether this error is a cancellation, which views ignore.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Request(RequestError::Cancelled))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Request(err) => err.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> ClientError {
        ClientError::Request(RequestError::Http {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        })
    }

    #[test]
    fn user_message_prefers_backend_error_field() {
        let err = http(400, r#"{"error":"Title is taken"}"#);
        assert_eq!(err.user_message("Failed to create event."), "Title is taken");

        let err = http(400, r#"{"detail":"Bad date"}"#);
        assert_eq!(err.user_message("Failed to create event."), "Bad date");
    }

    #[test]
    fn user_message_falls_back_on_unparsed_bodies() {
        let err = http(500, "<html>Internal Server Error</html>");
        assert_eq!(err.user_message("Failed to load events."), "Failed to load events.");
    }

    #[test]
    fn not_found_and_validation_have_fixed_text() {
        assert_eq!(
            ClientError::NotFound("Event".into()).user_message("x"),
            "Event not found."
        );
        assert_eq!(
            ClientError::Validation("Passwords do not match!".into()).user_message("x"),
            "Passwords do not match!"
        );
    }

    #[test]
    fn storage_failures_never_leak_io_text() {
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = ClientError::from(AuthError::Storage(StorageError::Io(io)));
        assert_eq!(err.user_message("Sign-in failed."), "Sign-in failed.");

        let err = ClientError::from(AuthError::InvalidCredentials);
        assert_eq!(
            err.user_message("Sign-in failed."),
            "Invalid credentials or server error."
        );
    }

    #[test]
    fn cancellation_is_recognised() {
        assert!(ClientError::Request(RequestError::Cancelled).is_cancelled());
        assert!(!http(404, "").is_cancelled());
        assert_eq!(http(409, "").status(), Some(StatusCode::CONFLICT));
    }
}
