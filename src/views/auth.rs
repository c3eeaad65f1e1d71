use crate::errors::ClientError;
use crate::forms::{LoginForm, RegistrationForm};
use crate::navigator::Route;
use crate::structs::Client;

const SIGN_IN_FAILED: &str = "Sign-in failed. Please try again.";
const REGISTRATION_FAILED: &str = "Registration failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

/// Sign-in / sign-up page. Errors stay on the view so the form can be retried.
#[derive(Debug, Default)]
pub struct AuthView {
    pub mode: AuthMode,
    pub error: Option<String>,
    pub submitting: bool,
}

impl AuthView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches between the two forms.
    pub fn toggle(&mut self) {
        self.mode = match self.mode {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        };
        self.error = None;
    }

    /// Signs in, then returns to the page that sent the user here, or Home.
    pub async fn sign_in(&mut self, client: &Client, form: &LoginForm) {
        self.error = None;

        let credentials = match form.validated() {
            Ok(credentials) => credentials,
            Err(err) => {
                self.error = Some(err.to_string());
                return;
            }
        };

        self.submitting = true;
        let result = client.login(&credentials).await;
        self.submitting = false;

        match result {
            Ok(_) => client.navigator().navigate(self.return_route(client)),
            Err(err) => {
                log::warn!("Sign-in failed: {err}");
                self.error = Some(ClientError::from(err).user_message(SIGN_IN_FAILED));
            }
        }
    }

    /// Registers, then flips back to the sign-in form.
    pub async fn sign_up(&mut self, client: &Client, form: &RegistrationForm) {
        self.error = None;

        let user = match form.validated() {
            Ok(user) => user,
            Err(err) => {
                self.error = Some(err.to_string());
                return;
            }
        };

        self.submitting = true;
        let result = client.register(&user).await;
        self.submitting = false;

        match result {
            Ok(()) => self.mode = AuthMode::SignIn,
            Err(err) => self.error = Some(err.user_message(REGISTRATION_FAILED)),
        }
    }

    fn return_route(&self, client: &Client) -> Route {
        client
            .navigator()
            .current_location()
            .and_then(|location| Route::parse(&location))
            .and_then(|route| match route {
                Route::Login {
                    return_to: Some(path),
                } => Route::parse(&path),
                _ => None,
            })
            .unwrap_or(Route::Home)
    }
}
