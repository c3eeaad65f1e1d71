use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::remote::{self, Remote};
use crate::structs::{Client, Event};

pub const NO_SLIDES: &str = "No events for the slideshow.";
const LOAD_FAILED: &str = "Failed to load events.";

/// Events dated `today` or later, soonest first. Undated events are left out.
pub fn upcoming_events(events: Vec<Event>, today: NaiveDate) -> Vec<Event> {
    let mut upcoming: Vec<(NaiveDate, Event)> = events
        .into_iter()
        .filter_map(|event| event.date_value().map(|date| (date, event)))
        .filter(|(date, _)| *date >= today)
        .collect();
    upcoming.sort_by_key(|(date, _)| *date);

    upcoming.into_iter().map(|(_, event)| event).collect()
}

/// Slideshow over a list of events. Stepping wraps around both ends, and
/// automatic advancing pauses while the pointer hovers it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Carousel {
    slides: Vec<Event>,
    index: usize,
    hovered: bool,
}

impl Carousel {
    pub fn new(slides: Vec<Event>) -> Self {
        Self {
            slides,
            index: 0,
            hovered: false,
        }
    }

    pub fn slides(&self) -> &[Event] {
        &self.slides
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Event> {
        self.slides.get(self.index)
    }

    /// Whether the previous/next controls are shown.
    pub fn has_controls(&self) -> bool {
        self.slides.len() > 1
    }

    pub fn next(&mut self) {
        if !self.slides.is_empty() {
            self.index = (self.index + 1) % self.slides.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.slides.is_empty() {
            self.index = (self.index + self.slides.len() - 1) % self.slides.len();
        }
    }

    pub fn set_hovered(&mut self, hovered: bool) {
        self.hovered = hovered;
    }

    /// Timer tick: advances unless hovered or there is nothing to advance to.
    pub fn tick(&mut self) {
        if self.has_controls() && !self.hovered {
            self.next();
        }
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        self.slides.is_empty().then_some(NO_SLIDES)
    }
}

/// Landing page with the upcoming-events carousel.
#[derive(Debug, Default)]
pub struct HomeView {
    pub upcoming: Remote<Carousel>,
    cancel: CancellationToken,
}

impl HomeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, client: &Client, today: NaiveDate) {
        let fetched = remote::load(&self.cancel, client.events(Some(&self.cancel)), LOAD_FAILED).await;
        if let Some(state) = fetched {
            self.upcoming = state.map(|events| Carousel::new(upcoming_events(events, today)));
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for HomeView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(title: &str, date: Option<&str>) -> Event {
        Event {
            title: Some(title.into()),
            date: date.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn upcoming_filters_and_sorts() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 17).unwrap();
        let events = vec![
            dated("awards", Some("2025-10-23")),
            dated("past", Some("2025-09-09")),
            dated("today", Some("2025-09-17")),
            dated("undated", None),
            dated("masterclass", Some("2025-10-14T09:00:00Z")),
        ];

        let titles: Vec<_> = upcoming_events(events, today)
            .iter()
            .map(|e| e.title_or_default().to_string())
            .collect();
        assert_eq!(titles, ["today", "masterclass", "awards"]);
    }

    #[test]
    fn carousel_wraps_both_ways() {
        let mut carousel = Carousel::new(vec![dated("a", None), dated("b", None), dated("c", None)]);

        carousel.prev();
        assert_eq!(carousel.index(), 2);
        carousel.next();
        assert_eq!(carousel.index(), 0);
        carousel.next();
        assert_eq!(carousel.current().unwrap().title.as_deref(), Some("b"));
    }

    #[test]
    fn carousel_pauses_while_hovered() {
        let mut carousel = Carousel::new(vec![dated("a", None), dated("b", None)]);

        carousel.set_hovered(true);
        carousel.tick();
        assert_eq!(carousel.index(), 0);

        carousel.set_hovered(false);
        carousel.tick();
        assert_eq!(carousel.index(), 1);
    }

    #[test]
    fn single_or_empty_carousel_stays_put() {
        let mut single = Carousel::new(vec![dated("a", None)]);
        single.tick();
        assert_eq!(single.index(), 0);
        assert!(!single.has_controls());

        let mut empty = Carousel::default();
        empty.next();
        empty.prev();
        assert_eq!(empty.current(), None);
        assert_eq!(empty.empty_message(), Some(NO_SLIDES));
    }
}
