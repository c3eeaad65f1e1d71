//! Page-level state for the application's views.
//!
//! Each view owns its data as a [`Remote`](crate::Remote) and takes the
//! [`Client`](crate::Client) per call. Views that fetch on load hold a
//! cancellation token that fires when the view is dropped, so a response
//! arriving after teardown changes nothing.

pub mod auth;
pub mod create_event;
pub mod event_details;
pub mod events;
pub mod home;
pub mod nav;
pub mod profile;

pub use auth::{AuthMode, AuthView};
pub use create_event::CreateEventView;
pub use event_details::EventDetailsView;
pub use events::EventsView;
pub use home::{Carousel, HomeView};
pub use nav::{NavBar, NavItem};
pub use profile::{ProfileData, ProfileView};
