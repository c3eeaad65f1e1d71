use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;

/// Profile of the signed-in user, cached in the session next to the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, alias = "_id", alias = "user_id")]
    pub id: Option<Id>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

impl UserProfile {
    /// "First Last", falling back to the email, then to "there".
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !name.is_empty() {
            name
        } else if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            email.to_string()
        } else {
            "there".to_string()
        }
    }

    /// Parses the body of `GET /auth/profile/`, which is either `{"user": {...}}`
    /// or the user object itself.
    pub(crate) fn from_profile_body(body: Value) -> Result<Self, serde_json::Error> {
        match body {
            Value::Object(mut map) if map.get("user").is_some_and(Value::is_object) => {
                serde_json::from_value(map.remove("user").unwrap_or_default())
            }
            other => serde_json::from_value(other),
        }
    }
}

/// Body of `POST /auth/login/`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Body of `POST /auth/register/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    pub password: String,
}

/// Body of a successful `POST /auth/login/`.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}
