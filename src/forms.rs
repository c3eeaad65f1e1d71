//! Client-side form checks. A form that fails validation never reaches the network.

use std::borrow::Cow;
use std::path::PathBuf;

use chrono::NaiveDate;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::errors::ClientError;
use crate::structs::event::EventImage;
use crate::structs::{Credentials, NewEvent, NewUser};

#[derive(Debug, Clone, Default, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Please enter both email and password."))]
    pub email: String,
    #[validate(length(min = 1, message = "Please enter both email and password."))]
    pub password: String,
}

impl LoginForm {
    pub fn validated(&self) -> Result<Credentials, ClientError> {
        self.validate().map_err(|errors| validation_error(&errors))?;
        Ok(Credentials::new(self.email.trim(), self.password.clone()))
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Please enter a password."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match!"))]
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn validated(&self) -> Result<NewUser, ClientError> {
        self.validate().map_err(|errors| validation_error(&errors))?;

        Ok(NewUser {
            first_name: non_empty(&self.first_name),
            last_name: non_empty(&self.last_name),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct EventForm {
    #[validate(length(min = 1, message = "Please give the event a title."))]
    pub title: String,
    pub description: String,
    pub details: String,
    /// `YYYY-MM-DD`.
    #[validate(custom(function = "validate_event_date"))]
    pub date: String,
    /// Cover image to upload with the event.
    pub image_path: Option<PathBuf>,
}

impl EventForm {
    /// Validates the fields and reads the image file, if any.
    pub async fn into_new_event(self) -> Result<NewEvent, ClientError> {
        self.validate().map_err(|errors| validation_error(&errors))?;

        let image = match &self.image_path {
            Some(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|err| {
                    log::warn!("Failed to read {}: {err}", path.display());
                    ClientError::Validation("Could not read the selected image.".to_string())
                })?;
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".to_string());
                Some(EventImage { file_name, bytes })
            }
            None => None,
        };

        Ok(NewEvent {
            title: self.title.trim().to_string(),
            description: self.description,
            details: self.details,
            date: self.date.trim().to_string(),
            image,
        })
    }
}

fn validate_event_date(date: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| {
            ValidationError::new("date")
                .with_message(Cow::Borrowed("Please pick a date (YYYY-MM-DD)."))
        })
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Joins the messages of every failed check, once each.
fn validation_error(errors: &ValidationErrors) -> ClientError {
    let mut messages = errors
        .field_errors()
        .values()
        .flat_map(|errs| {
            errs.iter()
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        })
        .collect::<Vec<_>>();
    messages.sort();
    messages.dedup();

    ClientError::Validation(messages.join(" "))
}
