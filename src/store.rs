//! Capability interface of the calendar store the bridge talks to.
//!
//! The dispatcher only ever sees this trait; [`crate::storage::SqliteStore`]
//! is the adapter shipped with the binary.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Store-native event as persisted by a [`CalendarStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// Assigned by the store on first save.
    pub id: Option<String>,
    pub calendar: Option<CalendarHandle>,
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Participant URIs in store order, e.g. `mailto:ada@example.com`.
    pub attendees: Vec<String>,
}

/// Opaque reference to a calendar inside the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarHandle(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    NotDetermined,
    Authorized,
    Denied,
}

/// Terminal answer to an access request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessGrant {
    Granted,
    Denied(Option<String>),
}

/// Completion handed to [`CalendarStore::request_access`]. Called at most
/// once, possibly from another thread.
pub type AccessCallback = Box<dyn FnOnce(AccessGrant) + Send + 'static>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Backend(String),

    #[error("event has no identifier")]
    Unsaved,

    #[error("stored timestamp '{0}' is not valid RFC3339")]
    CorruptTimestamp(String),
}

pub trait CalendarStore {
    /// Authorization state known without prompting.
    fn authorization_status(&self) -> AccessStatus;

    /// Asks for access; `completion` fires once the answer is known.
    fn request_access(&self, completion: AccessCallback);

    /// Events overlapping `[start, end)` in store order.
    fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError>;

    fn event_by_id(&self, id: &str) -> Result<Option<EventRecord>, StoreError>;

    /// Inserts or replaces `event`, assigning an id when it has none.
    fn save(&mut self, event: &mut EventRecord) -> Result<String, StoreError>;

    fn remove(&mut self, event: &EventRecord) -> Result<(), StoreError>;

    /// Destination for newly created events.
    fn default_calendar(&self) -> Option<CalendarHandle>;
}
