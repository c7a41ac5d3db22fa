use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{
    AccessCallback, AccessGrant, AccessStatus, CalendarHandle, CalendarStore, EventRecord,
    StoreError,
};

/// Local calendar database backing the bridge.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    auto_grant: bool,
    default_calendar_name: String,
}

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Answer used when access has never been decided for this database.
    pub auto_grant: bool,
    /// Title of the default calendar created in a fresh database.
    pub default_calendar_name: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            auto_grant: true,
            default_calendar_name: "Calendar".to_string(),
        }
    }
}

impl SqliteStore {
    pub fn new(path: &Path, options: StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
            auto_grant: options.auto_grant,
            default_calendar_name: options.default_calendar_name,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS calendars (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                calendar_id TEXT REFERENCES calendars(id),
                title TEXT,
                starts_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                location TEXT,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS events_by_start ON events (starts_at);
            CREATE TABLE IF NOT EXISTS event_attendees (
                event_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                uri TEXT NOT NULL,
                PRIMARY KEY (event_id, position),
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS access (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                status TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Created on first use; opening a database writes no rows.
    fn find_or_create_default_calendar(&self) -> rusqlite::Result<CalendarHandle> {
        let inserted = self.conn.execute(
            "INSERT INTO calendars (id, title, is_default) \
             SELECT ?1, ?2, 1 WHERE NOT EXISTS (SELECT 1 FROM calendars WHERE is_default = 1)",
            params![Uuid::new_v4().to_string(), self.default_calendar_name],
        )?;
        if inserted > 0 {
            debug!(title = %self.default_calendar_name, "created default calendar");
        }
        self.conn
            .query_row(
                "SELECT id FROM calendars WHERE is_default = 1 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .map(CalendarHandle)
    }

    fn load_attendees(&self, event_id: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri FROM event_attendees WHERE event_id = ?1 ORDER BY position")?;
        let rows = stmt.query_map(params![event_id], |row| row.get(0))?;
        let mut attendees = Vec::new();
        for uri in rows {
            attendees.push(uri?);
        }
        Ok(attendees)
    }

    fn hydrate(&self, row: EventRow) -> Result<EventRecord, StoreError> {
        let attendees = self.load_attendees(&row.id)?;
        Ok(EventRecord {
            start: parse_stored(&row.starts_at)?,
            end: parse_stored(&row.ends_at)?,
            id: Some(row.id),
            calendar: row.calendar_id.map(CalendarHandle),
            title: row.title,
            location: row.location,
            notes: row.notes,
            attendees,
        })
    }
}

impl CalendarStore for SqliteStore {
    fn authorization_status(&self) -> AccessStatus {
        match read_access_status(&self.conn) {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "could not read access status");
                AccessStatus::NotDetermined
            }
        }
    }

    fn request_access(&self, completion: AccessCallback) {
        let path = self.path.clone();
        let auto_grant = self.auto_grant;
        thread::spawn(move || {
            let grant = match decide_access(&path, auto_grant) {
                Ok(grant) => grant,
                Err(err) => AccessGrant::Denied(Some(err.to_string())),
            };
            completion(grant);
        });
    }

    fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, calendar_id, title, starts_at, ends_at, location, notes FROM events \
             WHERE starts_at < ?2 AND ends_at > ?1 ORDER BY starts_at, id",
        )?;
        let rows = stmt.query_map(
            params![format_stored(&start), format_stored(&end)],
            EventRow::from_row,
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(self.hydrate(row?)?);
        }
        Ok(events)
    }

    fn event_by_id(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, calendar_id, title, starts_at, ends_at, location, notes FROM events \
                 WHERE id = ?1",
                params![id],
                EventRow::from_row,
            )
            .optional()?;
        row.map(|row| self.hydrate(row)).transpose()
    }

    fn save(&mut self, event: &mut EventRecord) -> Result<String, StoreError> {
        let id = event
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let calendar = event.calendar.clone().or_else(|| self.default_calendar());

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO events (id, calendar_id, title, starts_at, ends_at, location, notes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET calendar_id = excluded.calendar_id, \
             title = excluded.title, starts_at = excluded.starts_at, ends_at = excluded.ends_at, \
             location = excluded.location, notes = excluded.notes",
            params![
                id,
                calendar.as_ref().map(|handle| handle.0.as_str()),
                event.title,
                format_stored(&event.start),
                format_stored(&event.end),
                event.location,
                event.notes,
            ],
        )?;
        tx.execute(
            "DELETE FROM event_attendees WHERE event_id = ?1",
            params![id],
        )?;
        for (position, uri) in event.attendees.iter().enumerate() {
            tx.execute(
                "INSERT INTO event_attendees (event_id, position, uri) VALUES (?1, ?2, ?3)",
                params![id, position as i64, uri],
            )?;
        }
        tx.commit()?;

        debug!(%id, "saved event");
        event.id = Some(id.clone());
        event.calendar = calendar;
        Ok(id)
    }

    fn remove(&mut self, event: &EventRecord) -> Result<(), StoreError> {
        let id = event.id.as_deref().ok_or(StoreError::Unsaved)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM event_attendees WHERE event_id = ?1",
            params![id],
        )?;
        let affected = tx.execute("DELETE FROM events WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::Backend(format!("event '{id}' no longer exists")));
        }
        tx.commit()?;
        debug!(%id, "removed event");
        Ok(())
    }

    fn default_calendar(&self) -> Option<CalendarHandle> {
        match self.find_or_create_default_calendar() {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "could not resolve default calendar");
                None
            }
        }
    }
}

struct EventRow {
    id: String,
    calendar_id: Option<String>,
    title: Option<String>,
    starts_at: String,
    ends_at: String,
    location: Option<String>,
    notes: Option<String>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            calendar_id: row.get(1)?,
            title: row.get(2)?,
            starts_at: row.get(3)?,
            ends_at: row.get(4)?,
            location: row.get(5)?,
            notes: row.get(6)?,
        })
    }
}

// Fixed-width UTC text keeps lexical order equal to chronological order.
fn format_stored(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_stored(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptTimestamp(value.to_string()))
}

fn read_access_status(conn: &Connection) -> rusqlite::Result<AccessStatus> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM access WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    Ok(match status.as_deref() {
        Some("authorized") => AccessStatus::Authorized,
        Some("denied") => AccessStatus::Denied,
        _ => AccessStatus::NotDetermined,
    })
}

fn decide_access(path: &Path, auto_grant: bool) -> Result<AccessGrant, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    let initial = if auto_grant { "authorized" } else { "denied" };
    conn.execute(
        "INSERT INTO access (id, status) VALUES (1, ?1) ON CONFLICT(id) DO NOTHING",
        params![initial],
    )?;

    Ok(match read_access_status(&conn)? {
        AccessStatus::Authorized => AccessGrant::Granted,
        AccessStatus::Denied => AccessGrant::Denied(Some("user denied".to_string())),
        AccessStatus::NotDetermined => {
            AccessGrant::Denied(Some("access status could not be recorded".to_string()))
        }
    })
}
