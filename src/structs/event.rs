use chrono::{DateTime, NaiveDate};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;
use crate::session::Session;

const DEFAULT_IMAGE: &str = "/imgs/default.jpg";
const IMAGE_DIR: &str = "/imgs";

/// Event object owned by the backend. Never mutated locally; attend/unattend
/// go through the API and the event is re-read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, alias = "_id")]
    pub id: Option<Id>,
    #[serde(default)]
    pub title: Option<String>,
    /// ISO date (`2025-09-09`) or full timestamp.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    /// Absolute URL or a file name under `/imgs/`.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<Id>>,
    #[serde(default)]
    pub attendees_count: Option<u64>,
    /// Whether the requesting user attends. Only present when the backend
    /// knows who is asking.
    #[serde(default)]
    pub attending: Option<bool>,
}

impl Event {
    pub fn title_or_default(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("Event")
    }

    pub fn attendee_count(&self) -> u64 {
        match &self.attendees {
            Some(list) => list.len() as u64,
            None => self.attendees_count.unwrap_or(0),
        }
    }

    /// "1 person attending" / "3 people attending".
    pub fn attendee_label(&self) -> String {
        let count = self.attendee_count();
        let noun = if count == 1 { "person" } else { "people" };
        format!("{count} {noun} attending")
    }

    /// Whether the holder of `session` attends this event.
    ///
    /// The server's `attending` flag is authoritative. Without it, the cached
    /// profile id is looked up in the attendee list.
    pub fn is_attended_by(&self, session: &Session) -> bool {
        if let Some(flag) = self.attending {
            return flag;
        }

        if !session.is_authenticated() {
            return false;
        }

        match (session.user().and_then(|u| u.id.as_ref()), &self.attendees) {
            (Some(user_id), Some(attendees)) => attendees.contains(user_id),
            _ => false,
        }
    }

    pub fn image_src(&self) -> String {
        match self.image.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_IMAGE.to_string(),
            Some(image) if is_absolute_url(image) => image.to_string(),
            Some(image) => format!("{IMAGE_DIR}/{}", image.trim_start_matches('/')),
        }
    }

    /// [`image_src`](Self::image_src) with a `?v=` suffix so a replaced image
    /// is not served from cache.
    pub fn versioned_image_src(&self) -> String {
        let src = self.image_src();
        match self.updated_at.as_deref().filter(|v| !v.is_empty()) {
            Some(version) => format!("{src}?v={}", urlencoding::encode(version)),
            None => src,
        }
    }

    pub fn date_value(&self) -> Option<NaiveDate> {
        let raw = self.date.as_deref()?.trim();

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }

    /// `09 Sep 2025`, or the raw date when it does not parse.
    pub fn display_date(&self) -> Option<String> {
        match self.date_value() {
            Some(date) => Some(date.format("%d %b %Y").to_string()),
            None => self.date.clone().filter(|d| !d.is_empty()),
        }
    }
}

fn is_absolute_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Extracts the event list from `GET /events/`: a bare array, or one wrapped
/// in `results` or `data`. Anything else is an empty list.
pub(crate) fn event_list(body: Value) -> Result<Vec<Event>, serde_json::Error> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match ["results", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }) {
            Some(items) => items,
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    serde_json::from_value(Value::Array(list))
}

/// Fields of `POST /events/`, sent as multipart form data.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub details: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub image: Option<EventImage>,
}

#[derive(Debug, Clone)]
pub struct EventImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl NewEvent {
    pub(crate) fn into_form(self) -> Form {
        let form = Form::new()
            .text("title", self.title)
            .text("description", self.description)
            .text("details", self.details)
            .text("date", self.date);

        match self.image {
            Some(image) => form.part("image", Part::bytes(image.bytes).file_name(image.file_name)),
            None => form,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::UserProfile;
    use serde_json::json;

    fn event(value: Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn attendee_count_prefers_list_over_counter() {
        let listed = event(json!({"attendees": [1, 2, 3], "attendees_count": 10}));
        let counted = event(json!({"attendees_count": 1}));

        assert_eq!(listed.attendee_count(), 3);
        assert_eq!(counted.attendee_label(), "1 person attending");
        assert_eq!(Event::default().attendee_label(), "0 people attending");
    }

    #[test]
    fn server_flag_decides_attendance() {
        let session = Session::new(
            Some("tok".into()),
            Some(UserProfile {
                id: Some(Id::from(1_u64)),
                ..Default::default()
            }),
        );

        let flagged = event(json!({"attending": false, "attendees": [1]}));
        assert!(!flagged.is_attended_by(&session));

        let unflagged = event(json!({"attendees": ["1", 2]}));
        assert!(unflagged.is_attended_by(&session));
        assert!(!unflagged.is_attended_by(&Session::anonymous()));
    }

    #[test]
    fn attendance_without_cached_profile_is_false() {
        let session = Session::new(Some("tok".into()), None);
        let ev = event(json!({"attendees": [1]}));

        assert!(!ev.is_attended_by(&session));
    }

    #[test]
    fn image_src_resolution() {
        assert_eq!(Event::default().image_src(), "/imgs/default.jpg");
        assert_eq!(
            event(json!({"image": "HTTPS://cdn.example.com/a.jpg"})).image_src(),
            "HTTPS://cdn.example.com/a.jpg"
        );
        assert_eq!(event(json!({"image": "event1.jpg"})).image_src(), "/imgs/event1.jpg");

        let versioned = event(json!({"image": "a.jpg", "updated_at": "2025-09-01T10:00:00Z"}));
        assert_eq!(
            versioned.versioned_image_src(),
            "/imgs/a.jpg?v=2025-09-01T10%3A00%3A00Z"
        );
    }

    #[test]
    fn dates_display_in_day_month_year() {
        assert_eq!(
            event(json!({"date": "2025-09-09"})).display_date().as_deref(),
            Some("09 Sep 2025")
        );
        assert_eq!(
            event(json!({"date": "2025-10-23T18:30:00+01:00"})).display_date().as_deref(),
            Some("23 Oct 2025")
        );
        assert_eq!(
            event(json!({"date": "next friday"})).display_date().as_deref(),
            Some("next friday")
        );
    }

    #[test]
    fn event_list_unwraps_known_envelopes() {
        let bare = event_list(json!([{"id": 1}])).unwrap();
        let results = event_list(json!({"results": [{"id": 1}, {"_id": {"$oid": "x"}}]})).unwrap();
        let data = event_list(json!({"data": [{"id": 1}]})).unwrap();
        let unknown = event_list(json!({"items": [{"id": 1}]})).unwrap();

        assert_eq!(bare.len(), 1);
        assert_eq!(results[1].id, Some(Id::from("x")));
        assert_eq!(data.len(), 1);
        assert!(unknown.is_empty());
    }
}
