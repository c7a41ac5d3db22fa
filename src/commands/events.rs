use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{
    error::BridgeError,
    event::{self, EventDto, NewEventRequest, UpdateEventRequest},
    store::{CalendarStore, EventRecord},
};

pub const DEMO_TITLE: &str = "calendar-bridge demo";
pub const DEMO_NOTES: &str = "Created by calendar-bridge --create";

pub fn read_events<S: CalendarStore + ?Sized>(
    store: &mut S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    create_demo: bool,
    now: DateTime<Utc>,
) -> Result<Vec<EventDto>, BridgeError> {
    if create_demo {
        let mut demo = demo_event(&*store, now);
        let id = store.save(&mut demo)?;
        info!(%id, "created demo event");
    }

    let events = store.events_in_range(start, end)?;
    debug!(count = events.len(), "fetched events");
    Ok(events.iter().map(event::to_dto).collect())
}

pub fn create_event<S: CalendarStore + ?Sized>(
    store: &mut S,
    request: NewEventRequest,
) -> Result<String, BridgeError> {
    let mut record = event::from_create_request(request, store.default_calendar());
    let id = store.save(&mut record)?;
    info!(%id, "created event");
    Ok(id)
}

pub fn update_event<S: CalendarStore + ?Sized>(
    store: &mut S,
    request: UpdateEventRequest,
) -> Result<(), BridgeError> {
    let mut record = find(&*store, &request.id)?;
    event::apply_update(&mut record, request);
    event::ensure_ordered(&record.start, &record.end)?;
    let id = store.save(&mut record)?;
    info!(%id, "updated event");
    Ok(())
}

pub fn delete_event<S: CalendarStore + ?Sized>(store: &mut S, id: &str) -> Result<(), BridgeError> {
    let record = find(&*store, id)?;
    store.remove(&record)?;
    info!(%id, "deleted event");
    Ok(())
}

fn find<S: CalendarStore + ?Sized>(store: &S, id: &str) -> Result<EventRecord, BridgeError> {
    store
        .event_by_id(id)?
        .ok_or_else(|| BridgeError::RecordNotFound(id.to_string()))
}

fn demo_event<S: CalendarStore + ?Sized>(store: &S, now: DateTime<Utc>) -> EventRecord {
    let start = now + Duration::minutes(5);
    EventRecord {
        id: None,
        calendar: store.default_calendar(),
        title: Some(DEMO_TITLE.to_string()),
        start,
        end: start + Duration::minutes(30),
        location: None,
        notes: Some(DEMO_NOTES.to_string()),
        attendees: Vec::new(),
    }
}
