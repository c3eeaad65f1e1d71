//! # sherohub-client
//!
//! Client SDK for the Shero Hub community events platform.
//!
//! The crate is built around two pieces:
//!
//! - [`SessionStore`](session::SessionStore) holds the bearer token and the
//!   cached profile, writes them through to durable [`Storage`](storage::Storage)
//!   and keeps sibling stores ("tabs") in sync over a [`SessionBus`](session::SessionBus).
//! - [`Gateway`](gateway::Gateway) sends every request, attaches the token and
//!   turns a 401 into a logout plus a redirect to the login view.
//!
//! [`Client`] wraps both with typed calls for the REST API, and the
//! [`views`] module holds the page-level state machines built on top.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod errors;
pub mod forms;
pub mod gateway;
mod logger;
pub mod navigator;
pub mod remote;
pub mod session;
pub mod storage;
pub mod structs;
pub mod views;

pub use config::ClientOptions;
pub use errors::{AuthError, ClientError, RequestError};
pub use navigator::{BrowserNavigator, MemoryNavigator, Navigator, Route};
pub use remote::Remote;
pub use session::{Session, SessionBus, SessionStore};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use structs::{AttendOutcome, Client, Event, Id, UserProfile};

/// Locks `mutex`, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
