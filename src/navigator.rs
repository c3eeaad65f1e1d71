use std::sync::Mutex;

use log::{debug, warn};

use crate::lock;
use crate::structs::Id;

const LOGIN_PATH: &str = "/login";

/// Views of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Events,
    /// `/events/<id>`. The id `new` is reserved: `/events/new` always parses
    /// as [`Route::CreateEvent`].
    EventDetails(Id),
    CreateEvent,
    Profile,
    /// `return_to` is the path to go back to after signing in.
    Login { return_to: Option<String> },
}

impl Route {
    /// Login route returning to `return_to`. Only paths of this app are kept:
    /// absolute and protocol-relative URLs are dropped, and a login page is
    /// never a return target.
    pub fn login(return_to: Option<String>) -> Self {
        let return_to =
            return_to.filter(|path| is_app_path(path) && !path.starts_with(LOGIN_PATH));
        Route::Login { return_to }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Events => "/events".to_string(),
            Route::EventDetails(id) => format!("/events/{}", urlencoding::encode(id.as_str())),
            Route::CreateEvent => "/events/new".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::Login { return_to: None } => LOGIN_PATH.to_string(),
            Route::Login {
                return_to: Some(path),
            } => format!("{LOGIN_PATH}?from={}", urlencoding::encode(path)),
        }
    }

    /// Inverse of [`path`](Self::path).
    pub fn parse(path: &str) -> Option<Self> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        match path {
            "/" => Some(Route::Home),
            "/events" => Some(Route::Events),
            "/events/new" => Some(Route::CreateEvent),
            "/profile" => Some(Route::Profile),
            LOGIN_PATH => {
                let return_to = query
                    .into_iter()
                    .flat_map(|q| q.split('&'))
                    .find_map(|pair| pair.strip_prefix("from="))
                    .and_then(|raw| urlencoding::decode(raw).ok())
                    .map(|decoded| decoded.into_owned());
                Some(Route::login(return_to))
            }
            other => {
                let id = other.strip_prefix("/events/")?;
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                let id = urlencoding::decode(id).ok()?;
                Some(Route::EventDetails(Id::new(id.into_owned())))
            }
        }
    }
}

/// `/profile` but not `//host/...` or `/\host/...`, which browsers resolve to
/// another origin.
fn is_app_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

/// Moves the UI between views.
pub trait Navigator: Send + Sync {
    /// Path of the view currently shown, if any.
    fn current_location(&self) -> Option<String>;

    fn navigate(&self, route: Route);
}

/// Navigator that only records where it was sent. For headless use and tests.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    history: Mutex<Vec<Route>>,
}

impl MemoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigator already showing `route`.
    pub fn at(route: Route) -> Self {
        Self {
            history: Mutex::new(vec![route]),
        }
    }

    pub fn current_route(&self) -> Option<Route> {
        lock(&self.history).last().cloned()
    }

    pub fn history(&self) -> Vec<Route> {
        lock(&self.history).clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> Option<String> {
        self.current_route().map(|route| route.path())
    }

    fn navigate(&self, route: Route) {
        debug!("Navigating to {}", route.path());
        lock(&self.history).push(route);
    }
}

/// Navigator that opens each view of the web app in the system browser.
#[derive(Debug)]
pub struct BrowserNavigator {
    app_url: String,
    current: Mutex<Option<Route>>,
}

impl BrowserNavigator {
    pub fn new(app_url: &str) -> Self {
        Self {
            app_url: app_url.trim_end_matches('/').to_string(),
            current: Mutex::new(None),
        }
    }

    pub fn url_for(&self, route: &Route) -> String {
        format!("{}{}", self.app_url, route.path())
    }
}

impl Navigator for BrowserNavigator {
    fn current_location(&self) -> Option<String> {
        lock(&self.current).as_ref().map(Route::path)
    }

    fn navigate(&self, route: Route) {
        let url = self.url_for(&route);
        if let Err(err) = open::that(&url) {
            warn!("Failed to open {url} in the browser: {err}");
        }
        *lock(&self.current) = Some(route);
    }
}
