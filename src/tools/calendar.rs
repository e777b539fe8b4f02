use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::{ErrorShape, Tool};
use crate::store::{JsonStore, StoreError};

/// A calendar entry as stored in `events.json`.
///
/// The stored object is kept whole, so keys of any type are written back
/// untouched. `date` and `event` only count when they are strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub fn date(&self) -> Option<&str> {
        self.0.get("date").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("event").and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventsResult {
    Found { date: String, events: Vec<Event> },
    Empty { message: String },
    Error { error: String },
}

impl ErrorShape for EventsResult {
    fn from_error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AddEventResult {
    Added { message: String, event: Event },
    Error { error: String },
}

impl ErrorShape for AddEventResult {
    fn from_error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Reads events for a single day from the events file.
pub struct CalendarReader {
    store: JsonStore<Event>,
}

impl CalendarReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    fn events_on(&self, date: &str) -> EventsResult {
        let events = match self.store.load() {
            Ok(events) => events,
            Err(StoreError::NotFound(path)) => {
                log::error!("Calendar: events file missing at {}", path.display());
                return EventsResult::from_error("events file not found");
            }
            Err(StoreError::InvalidJson { path, source }) => {
                log::error!("Calendar: unable to parse {}: {}", path.display(), source);
                return EventsResult::from_error("events file is not valid JSON");
            }
            Err(StoreError::UnexpectedShape { path, source }) => {
                log::error!("Calendar: unexpected layout in {}: {}", path.display(), source);
                return EventsResult::from_error("events file does not contain a list of events");
            }
            Err(e) => {
                log::error!("Calendar: {}", e);
                return EventsResult::from_error(e.to_string());
            }
        };

        log::debug!("Calendar: looking up events for {}", date);
        let matching: Vec<Event> = events
            .into_iter()
            .filter(|e| e.date() == Some(date))
            .collect();

        if matching.is_empty() {
            log::info!("Calendar: no events found for {}", date);
            return EventsResult::Empty {
                message: format!("No events found for {}", date),
            };
        }

        log::debug!("Calendar: found {} event(s) for {}", matching.len(), date);
        EventsResult::Found {
            date: date.to_string(),
            events: matching,
        }
    }
}

#[async_trait::async_trait]
impl Tool for CalendarReader {
    /// Target date; `None` means today.
    type Input = Option<String>;
    type Output = EventsResult;

    fn name(&self) -> &str {
        "calendar"
    }

    async fn run(&self, date: Option<String>) -> Result<EventsResult> {
        let date = date.filter(|d| !d.is_empty()).unwrap_or_else(today);
        Ok(self.events_on(&date))
    }
}

/// Appends validated events to the events file.
pub struct EventWriter {
    store: JsonStore<Event>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    /// Check the raw record and turn it into an [`Event`], or describe what is wrong.
    /// Keys other than `date` and `event` are accepted as given.
    fn validate(record: Value) -> std::result::Result<Event, String> {
        let Value::Object(fields) = record else {
            return Err("event_data must be a dictionary".to_string());
        };

        let present = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty())
        };
        let missing: Vec<&str> = ["date", "event"]
            .into_iter()
            .filter(|key| !present(key))
            .collect();
        if !missing.is_empty() {
            return Err(format!("Missing required fields: {}", missing.join(", ")));
        }

        let event = Event::from(fields);
        let date = event.date().unwrap_or_default();
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err("date must be in YYYY-MM-DD format".to_string());
        }

        Ok(event)
    }

    fn load_for_append(&self) -> Result<Vec<Event>> {
        if self.store.ensure_exists()? {
            log::warn!(
                "EventWriter: events file not found at {}; created a new file",
                self.store.path().display()
            );
        }

        match self.store.load() {
            Ok(events) => Ok(events),
            Err(StoreError::InvalidJson { path, source }) => {
                log::error!(
                    "EventWriter: unable to parse {} ({}); existing content will be replaced",
                    path.display(),
                    source
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Tool for EventWriter {
    /// The raw record, expected to be a JSON object.
    type Input = Value;
    type Output = AddEventResult;

    fn name(&self) -> &str {
        "add-event"
    }

    async fn run(&self, record: Value) -> Result<AddEventResult> {
        let event = match Self::validate(record) {
            Ok(event) => event,
            Err(message) => {
                log::error!("EventWriter: rejected event: {}", message);
                return Ok(AddEventResult::from_error(message));
            }
        };

        let mut events = self.load_for_append()?;
        events.push(event.clone());
        self.store
            .save(&events)
            .context("EventWriter: failed to save events")?;

        log::info!(
            "EventWriter: added event on {}: {}",
            event.date().unwrap_or_default(),
            event.name().unwrap_or_default()
        );
        Ok(AddEventResult::Added {
            message: "Event added successfully.".to_string(),
            event,
        })
    }
}
