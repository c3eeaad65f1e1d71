use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::errors::ClientError;

/// State of data a view fetches from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Remote<T> {
    Loading,
    /// User-visible message.
    Error(String),
    Ready(T),
}

impl<T> Default for Remote<T> {
    fn default() -> Self {
        Remote::Loading
    }
}

impl<T> Remote<T> {
    /// `None` for a cancelled fetch: the view was torn down and nothing should
    /// change. Other errors become a user-visible message, `fallback` unless
    /// the backend said something more specific.
    pub fn from_result(result: Result<T, ClientError>, fallback: &str) -> Option<Self> {
        match result {
            Ok(data) => Some(Remote::Ready(data)),
            Err(err) if err.is_cancelled() => None,
            Err(err) => {
                log::warn!("Fetch failed: {err}");
                Some(Remote::Error(err.user_message(fallback)))
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Remote::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Remote::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Remote::Error(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Remote<U> {
        match self {
            Remote::Loading => Remote::Loading,
            Remote::Error(message) => Remote::Error(message),
            Remote::Ready(data) => Remote::Ready(f(data)),
        }
    }
}

/// Runs `fetch` unless `cancel` fires first. See [`Remote::from_result`].
pub async fn load<T, F>(cancel: &CancellationToken, fetch: F, fallback: &str) -> Option<Remote<T>>
where
    F: Future<Output = Result<T, ClientError>>,
{
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        result = fetch => result,
    };

    Remote::from_result(result, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RequestError;
    use std::future::pending;

    #[test]
    fn errors_become_user_messages() {
        let state: Option<Remote<u8>> = Remote::from_result(
            Err(ClientError::NotFound("Event".into())),
            "Failed to load event.",
        );
        assert_eq!(state, Some(Remote::Error("Event not found.".into())));

        let cancelled: Option<Remote<u8>> =
            Remote::from_result(Err(RequestError::Cancelled.into()), "x");
        assert_eq!(cancelled, None);
    }

    #[test]
    fn map_keeps_state() {
        assert_eq!(Remote::Ready(2).map(|n| n * 2), Remote::Ready(4));
        assert_eq!(Remote::<u8>::Loading.map(|n| n * 2), Remote::Loading);
        assert!(Remote::<u8>::default().is_loading());
    }

    #[tokio::test]
    async fn load_is_silent_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let state = load(&cancel, pending::<Result<u8, ClientError>>(), "x").await;
        assert_eq!(state, None);

        let state = load(&CancellationToken::new(), async { Ok(7u8) }, "x").await;
        assert_eq!(state, Some(Remote::Ready(7)));
    }
}
