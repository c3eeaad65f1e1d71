use std::sync::{Arc, Mutex};

use crate::lock;
use crate::navigator::Route;
use crate::session::{ListenerId, Session, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavItem {
    Link { label: &'static str, route: Route },
    Logout,
}

/// Top navigation. Its items follow the session through a change listener,
/// including changes made in other tabs.
#[derive(Debug)]
pub struct NavBar {
    items: Mutex<Vec<NavItem>>,
}

impl NavBar {
    pub fn items_for(session: &Session) -> Vec<NavItem> {
        let mut items = vec![
            NavItem::Link {
                label: "Shero Hub",
                route: Route::Home,
            },
            NavItem::Link {
                label: "Events",
                route: Route::Events,
            },
        ];

        if session.is_authenticated() {
            items.push(NavItem::Link {
                label: "Create event",
                route: Route::CreateEvent,
            });
            items.push(NavItem::Link {
                label: "Profile",
                route: Route::Profile,
            });
            items.push(NavItem::Logout);
        } else {
            items.push(NavItem::Link {
                label: "Connect",
                route: Route::login(None),
            });
        }

        items
    }

    /// Creates a bar kept in sync with `store`. Drop the returned listener
    /// with [`SessionStore::remove_listener`] when the bar goes away.
    pub fn bind(store: &SessionStore) -> (Arc<Self>, ListenerId) {
        let bar = Arc::new(Self {
            items: Mutex::new(Self::items_for(&store.current_session())),
        });

        let weak = Arc::downgrade(&bar);
        let listener = store.on_session_change(move |change| {
            if let Some(bar) = weak.upgrade() {
                *lock(&bar.items) = Self::items_for(&change.session);
            }
        });

        (bar, listener)
    }

    pub fn items(&self) -> Vec<NavItem> {
        lock(&self.items).clone()
    }
}
