//! Mapping between store records and the JSON shapes on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::BridgeError,
    store::{CalendarHandle, EventRecord},
    timestamp,
};

pub const UNTITLED: &str = "(untitled)";

/// One event in read output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventDto {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub attendees: Vec<String>,
}

/// `--create-json` payload as it arrives on stdin.
#[derive(Debug, Deserialize)]
pub struct NewEventPayload {
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// `--update-json` payload as it arrives on stdin.
#[derive(Debug, Deserialize)]
pub struct UpdateEventPayload {
    pub id: String,
    #[serde(default)]
    pub title: Field<String>,
    #[serde(default)]
    pub start: Field<String>,
    #[serde(default)]
    pub end: Field<String>,
    #[serde(default)]
    pub location: Field<String>,
    #[serde(default)]
    pub notes: Field<String>,
    #[serde(default)]
    pub attendees: Field<Vec<String>>,
}

/// Whether an update payload carried a field. `null` counts as absent, so a
/// field can be overwritten but never cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Absent => Field::Absent,
            Field::Set(value) => Field::Set(f(value)),
        }
    }

    fn apply_to(self, target: &mut T) {
        if let Field::Set(value) = self {
            *target = value;
        }
    }
}

impl<T, E> Field<Result<T, E>> {
    pub fn transpose(self) -> Result<Field<T>, E> {
        match self {
            Field::Absent => Ok(Field::Absent),
            Field::Set(value) => value.map(Field::Set),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Field::Set(value),
            None => Field::Absent,
        })
    }
}

/// Validated creation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEventRequest {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub attendees: Vec<String>,
}

/// Validated partial update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateEventRequest {
    pub id: String,
    pub title: Field<String>,
    pub start: Field<DateTime<Utc>>,
    pub end: Field<DateTime<Utc>>,
    pub location: Field<String>,
    pub notes: Field<String>,
    pub attendees: Field<Vec<String>>,
}

impl TryFrom<NewEventPayload> for NewEventRequest {
    type Error = BridgeError;

    fn try_from(payload: NewEventPayload) -> Result<Self, Self::Error> {
        let start = timestamp::parse(&payload.start)?;
        let end = timestamp::parse(&payload.end)?;
        ensure_ordered(&start, &end)?;
        Ok(Self {
            title: payload.title,
            start,
            end,
            location: payload.location,
            notes: payload.notes,
            attendees: payload.attendees,
        })
    }
}

impl TryFrom<UpdateEventPayload> for UpdateEventRequest {
    type Error = BridgeError;

    fn try_from(payload: UpdateEventPayload) -> Result<Self, Self::Error> {
        let start = payload.start.map(|value| timestamp::parse(&value)).transpose()?;
        let end = payload.end.map(|value| timestamp::parse(&value)).transpose()?;
        if let (Field::Set(start), Field::Set(end)) = (&start, &end) {
            ensure_ordered(start, end)?;
        }
        Ok(Self {
            id: payload.id,
            title: payload.title,
            start,
            end,
            location: payload.location,
            notes: payload.notes,
            attendees: payload.attendees,
        })
    }
}

pub fn ensure_ordered(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<(), BridgeError> {
    if start < end {
        Ok(())
    } else {
        Err(BridgeError::InvalidRange {
            start: timestamp::render(start),
            end: timestamp::render(end),
        })
    }
}

pub fn to_dto(event: &EventRecord) -> EventDto {
    EventDto {
        id: event.id.clone().unwrap_or_default(),
        title: event.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
        start: timestamp::render(&event.start),
        end: timestamp::render(&event.end),
        location: event.location.clone(),
        notes: event.notes.clone(),
        attendees: event
            .attendees
            .iter()
            .map(|uri| strip_scheme(uri).to_string())
            .collect(),
    }
}

pub fn from_create_request(
    request: NewEventRequest,
    calendar: Option<CalendarHandle>,
) -> EventRecord {
    EventRecord {
        id: None,
        calendar,
        title: Some(request.title),
        start: request.start,
        end: request.end,
        location: request.location,
        notes: request.notes,
        attendees: request
            .attendees
            .iter()
            .map(|address| to_participant_uri(address))
            .collect(),
    }
}

/// Overwrites every field the update carries and leaves the rest alone.
/// The caller resolves `request.id` to `event` beforehand.
pub fn apply_update(event: &mut EventRecord, request: UpdateEventRequest) {
    request.title.map(Some).apply_to(&mut event.title);
    request.start.apply_to(&mut event.start);
    request.end.apply_to(&mut event.end);
    request.location.map(Some).apply_to(&mut event.location);
    request.notes.map(Some).apply_to(&mut event.notes);
    request
        .attendees
        .map(|list| list.iter().map(|address| to_participant_uri(address)).collect())
        .apply_to(&mut event.attendees);
}

/// Drops exactly one leading URI scheme (`mailto:`, `sip:`, ...).
pub fn strip_scheme(uri: &str) -> &str {
    match uri.split_once(':') {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => uri,
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn to_participant_uri(address: &str) -> String {
    let address = address.trim();
    if strip_scheme(address) != address {
        address.to_string()
    } else {
        format!("mailto:{address}")
    }
}
