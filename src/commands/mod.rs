mod events;

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use events::{create_event, delete_event, read_events, update_event};

use crate::{
    auth::AuthorizationGate,
    cli::Cli,
    error::BridgeError,
    event::{self, NewEventPayload, NewEventRequest, UpdateEventPayload, UpdateEventRequest},
    response::Response,
    store::CalendarStore,
    timestamp,
};

/// Exactly one operation per process, validated before the store is touched.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    Delete {
        id: String,
    },
    Create(NewEventRequest),
    Update(UpdateEventRequest),
    Read {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        create_demo: bool,
    },
}

impl Invocation {
    /// Picks the mode from the flags present and decodes its inputs. Payload
    /// modes consume `stdin`; other modes never read it.
    pub fn resolve<R: Read>(cli: &Cli, stdin: R) -> Result<Self, BridgeError> {
        let reading = cli.start.is_some() || cli.end.is_some() || cli.create;
        // Listed in precedence order: delete, create, update, read.
        let modes: Vec<&'static str> = [
            (cli.delete_id.is_some(), "--delete-id"),
            (cli.create_json, "--create-json"),
            (cli.update_json, "--update-json"),
            (reading, "--start/--end"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect();
        if modes.len() > 1 {
            return Err(BridgeError::ConflictingModes(modes));
        }

        let invocation = if let Some(id) = &cli.delete_id {
            Invocation::Delete { id: id.clone() }
        } else if cli.create_json {
            let payload: NewEventPayload = decode_payload(stdin)?;
            Invocation::Create(payload.try_into()?)
        } else if cli.update_json {
            let payload: UpdateEventPayload = decode_payload(stdin)?;
            Invocation::Update(payload.try_into()?)
        } else {
            let start = cli
                .start
                .as_deref()
                .ok_or(BridgeError::MissingParameter("--start"))?;
            let end = cli
                .end
                .as_deref()
                .ok_or(BridgeError::MissingParameter("--end"))?;
            let start = timestamp::parse(start)?;
            let end = timestamp::parse(end)?;
            event::ensure_ordered(&start, &end)?;
            Invocation::Read {
                start,
                end,
                create_demo: cli.create,
            }
        };
        debug!(?invocation, "resolved invocation");
        Ok(invocation)
    }
}

/// Opens the authorization gate, then runs `invocation` against `store`.
pub fn dispatch<S: CalendarStore + ?Sized>(
    invocation: Invocation,
    store: &mut S,
    gate: &AuthorizationGate,
    now: DateTime<Utc>,
) -> Result<Response, BridgeError> {
    gate.ensure_access(&*store)?;

    match invocation {
        Invocation::Delete { id } => {
            delete_event(store, &id)?;
            Ok(Response::Done)
        }
        Invocation::Create(request) => {
            let id = create_event(store, request)?;
            Ok(Response::Created { id })
        }
        Invocation::Update(request) => {
            update_event(store, request)?;
            Ok(Response::Done)
        }
        Invocation::Read {
            start,
            end,
            create_demo,
        } => read_events(store, start, end, create_demo, now).map(Response::Events),
    }
}

fn decode_payload<T: DeserializeOwned, R: Read>(mut stdin: R) -> Result<T, BridgeError> {
    let mut raw = String::new();
    stdin
        .read_to_string(&mut raw)
        .map_err(|err| BridgeError::MalformedPayload(format!("failed to read stdin: {err}")))?;
    serde_json::from_str(&raw).map_err(|err| BridgeError::MalformedPayload(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::TimeZone;

    use super::{
        events::{DEMO_NOTES, DEMO_TITLE},
        *,
    };
    use crate::{
        event::{EventDto, Field},
        store::{
            AccessCallback, AccessGrant, AccessStatus, CalendarHandle, EventRecord, StoreError,
        },
    };

    /// In-process store that counts every data call.
    struct MemoryStore {
        events: Vec<EventRecord>,
        grant: AccessGrant,
        next_id: usize,
        calls: Cell<usize>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                grant: AccessGrant::Granted,
                next_id: 1,
                calls: Cell::new(0),
            }
        }

        fn denying() -> Self {
            Self {
                grant: AccessGrant::Denied(None),
                ..Self::new()
            }
        }

        fn touch(&self) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    impl CalendarStore for MemoryStore {
        fn authorization_status(&self) -> AccessStatus {
            AccessStatus::NotDetermined
        }

        fn request_access(&self, completion: AccessCallback) {
            completion(self.grant.clone());
        }

        fn events_in_range(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<EventRecord>, StoreError> {
            self.touch();
            Ok(self
                .events
                .iter()
                .filter(|event| event.start < end && event.end > start)
                .cloned()
                .collect())
        }

        fn event_by_id(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
            self.touch();
            Ok(self
                .events
                .iter()
                .find(|event| event.id.as_deref() == Some(id))
                .cloned())
        }

        fn save(&mut self, event: &mut EventRecord) -> Result<String, StoreError> {
            self.touch();
            let id = event.id.clone().unwrap_or_else(|| {
                self.next_id += 1;
                format!("mem-{}", self.next_id - 1)
            });
            event.id = Some(id.clone());
            self.events.retain(|existing| existing.id.as_deref() != Some(id.as_str()));
            self.events.push(event.clone());
            Ok(id)
        }

        fn remove(&mut self, event: &EventRecord) -> Result<(), StoreError> {
            self.touch();
            let before = self.events.len();
            self.events.retain(|existing| existing.id != event.id);
            if self.events.len() == before {
                return Err(StoreError::Backend("not stored".into()));
            }
            Ok(())
        }

        fn default_calendar(&self) -> Option<CalendarHandle> {
            Some(CalendarHandle("default".into()))
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, day, hour, 0, 0).unwrap()
    }

    fn read_cli(start: &str, end: &str) -> Cli {
        Cli {
            start: Some(start.into()),
            end: Some(end.into()),
            ..Cli::default()
        }
    }

    fn run(cli: &Cli, stdin: &str, store: &mut MemoryStore) -> Result<Response, BridgeError> {
        let invocation = Invocation::resolve(cli, stdin.as_bytes())?;
        dispatch(invocation, store, &AuthorizationGate::new(None), at(7, 12))
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.events.push(EventRecord {
            id: Some("evt-1".into()),
            calendar: Some(CalendarHandle("default".into())),
            title: Some("Design review".into()),
            start: at(7, 10),
            end: at(7, 11),
            location: Some("Room 4".into()),
            notes: None,
            attendees: vec!["mailto:ada@example.com".into()],
        });
        store
    }

    #[test]
    fn read_returns_events_in_window() {
        let mut store = seeded();
        let cli = read_cli("2025-05-07T00:00:00Z", "2025-05-08T00:00:00Z");
        let response = run(&cli, "", &mut store).unwrap();
        assert_eq!(
            response,
            Response::Events(vec![EventDto {
                id: "evt-1".into(),
                title: "Design review".into(),
                start: "2025-05-07T10:00:00Z".into(),
                end: "2025-05-07T11:00:00Z".into(),
                location: Some("Room 4".into()),
                notes: None,
                attendees: vec!["ada@example.com".into()],
            }])
        );
    }

    #[test]
    fn inverted_or_empty_window_never_queries() {
        let mut store = seeded();
        for (start, end) in [
            ("2025-05-08T00:00:00Z", "2025-05-07T00:00:00Z"),
            ("2025-05-07T00:00:00Z", "2025-05-07T00:00:00.000Z"),
        ] {
            let err = run(&read_cli(start, end), "", &mut store).unwrap_err();
            assert!(matches!(err, BridgeError::InvalidRange { .. }));
        }
        assert_eq!(store.calls.get(), 0);
    }

    #[test]
    fn read_requires_both_bounds() {
        let cli = Cli {
            start: Some("2025-05-07T00:00:00Z".into()),
            ..Cli::default()
        };
        assert!(matches!(
            Invocation::resolve(&cli, "".as_bytes()),
            Err(BridgeError::MissingParameter("--end"))
        ));
        assert!(matches!(
            Invocation::resolve(&Cli::default(), "".as_bytes()),
            Err(BridgeError::MissingParameter("--start"))
        ));
    }

    #[test]
    fn unparseable_bound_is_reported() {
        let cli = read_cli("2025-05-07", "2025-05-08T00:00:00Z");
        assert!(matches!(
            Invocation::resolve(&cli, "".as_bytes()),
            Err(BridgeError::InvalidTimestamp(value)) if value == "2025-05-07"
        ));
    }

    #[test]
    fn more_than_one_mode_is_rejected() {
        let cli = Cli {
            delete_id: Some("evt-1".into()),
            update_json: true,
            create: true,
            ..Cli::default()
        };
        match Invocation::resolve(&cli, "".as_bytes()) {
            Err(BridgeError::ConflictingModes(modes)) => {
                assert_eq!(modes, ["--delete-id", "--update-json", "--start/--end"]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn create_demo_event_while_reading() {
        let mut store = MemoryStore::new();
        let cli = Cli {
            create: true,
            ..read_cli("2025-05-07T00:00:00Z", "2025-05-08T00:00:00Z")
        };
        let Response::Events(events) = run(&cli, "", &mut store).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, DEMO_TITLE);
        assert_eq!(events[0].notes.as_deref(), Some(DEMO_NOTES));
        assert_eq!(events[0].start, "2025-05-07T12:05:00Z");
        assert_eq!(events[0].end, "2025-05-07T12:35:00Z");
    }

    #[test]
    fn created_event_is_readable() {
        let mut store = MemoryStore::new();
        let cli = Cli {
            create_json: true,
            ..Cli::default()
        };
        let payload = r#"{"title":"X","start":"2025-01-01T00:00:00Z","end":"2025-01-01T01:00:00Z"}"#;
        let Response::Created { id } = run(&cli, payload, &mut store).unwrap() else {
            panic!("expected created response");
        };
        assert!(!id.is_empty());
        assert_eq!(
            store.events[0].calendar,
            Some(CalendarHandle("default".into()))
        );

        let read = read_cli("2025-01-01T00:00:00Z", "2025-01-01T02:00:00Z");
        let Response::Events(events) = run(&read, "", &mut store).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].title, "X");
    }

    #[test]
    fn malformed_payloads_are_rejected_before_access() {
        let mut store = MemoryStore::new();
        let cli = Cli {
            create_json: true,
            ..Cli::default()
        };
        for payload in ["", "{", r#"{"title":"X"}"#, r#"[1,2]"#] {
            let err = run(&cli, payload, &mut store).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedPayload(_)), "{payload}: {err:?}");
        }
        assert_eq!(store.calls.get(), 0);
    }

    #[test]
    fn update_payloads_are_validated_before_access() {
        let mut store = seeded();
        let cli = Cli {
            update_json: true,
            ..Cli::default()
        };
        for payload in ["", "{", r#"{"title":"x"}"#, r#"{"id":5}"#] {
            let err = run(&cli, payload, &mut store).unwrap_err();
            assert!(matches!(err, BridgeError::MalformedPayload(_)), "{payload}: {err:?}");
        }

        let err = run(&cli, r#"{"id":"evt-1","start":"yesterday"}"#, &mut store).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTimestamp(ref value) if value == "yesterday"));

        let inverted =
            r#"{"id":"evt-1","start":"2025-05-07T12:00:00Z","end":"2025-05-07T10:00:00Z"}"#;
        let err = run(&cli, inverted, &mut store).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRange { .. }), "{err:?}");

        assert_eq!(store.calls.get(), 0);
        assert_eq!(store.events[0].title.as_deref(), Some("Design review"));
    }

    #[test]
    fn update_merges_present_fields() {
        let mut store = seeded();
        let cli = Cli {
            update_json: true,
            ..Cli::default()
        };
        let response = run(&cli, r#"{"id":"evt-1","title":"Renamed","notes":"agenda"}"#, &mut store);
        assert_eq!(response.unwrap(), Response::Done);

        let updated = &store.events[0];
        assert_eq!(updated.title.as_deref(), Some("Renamed"));
        assert_eq!(updated.notes.as_deref(), Some("agenda"));
        assert_eq!(updated.location.as_deref(), Some("Room 4"));
        assert_eq!(updated.start, at(7, 10));
        assert_eq!(updated.attendees, ["mailto:ada@example.com"]);
    }

    #[test]
    fn update_that_inverts_the_event_is_rejected() {
        let mut store = seeded();
        let cli = Cli {
            update_json: true,
            ..Cli::default()
        };
        let err = run(&cli, r#"{"id":"evt-1","start":"2025-05-07T12:00:00Z"}"#, &mut store)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRange { .. }));
        assert_eq!(store.events[0].start, at(7, 10));
    }

    #[test]
    fn update_of_unknown_id_is_not_found() {
        let mut store = seeded();
        let request = UpdateEventRequest {
            id: "nope".into(),
            title: Field::Set("x".into()),
            ..Default::default()
        };
        let err = dispatch(
            Invocation::Update(request),
            &mut store,
            &AuthorizationGate::new(None),
            at(7, 12),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::RecordNotFound(id) if id == "nope"));
    }

    #[test]
    fn delete_removes_event_or_reports_missing() {
        let mut store = seeded();
        let cli = Cli {
            delete_id: Some("evt-1".into()),
            ..Cli::default()
        };
        assert_eq!(run(&cli, "", &mut store).unwrap(), Response::Done);
        assert!(store.events.is_empty());

        let err = run(&cli, "", &mut store).unwrap_err();
        assert!(matches!(err, BridgeError::RecordNotFound(id) if id == "evt-1"));
    }

    #[test]
    fn denial_short_circuits_every_mode() {
        let invocations = vec![
            Invocation::Delete { id: "evt-1".into() },
            Invocation::Create(NewEventRequest {
                title: "X".into(),
                start: at(7, 10),
                end: at(7, 11),
                location: None,
                notes: None,
                attendees: Vec::new(),
            }),
            Invocation::Update(UpdateEventRequest {
                id: "evt-1".into(),
                ..Default::default()
            }),
            Invocation::Read {
                start: at(7, 0),
                end: at(8, 0),
                create_demo: true,
            },
        ];
        for invocation in invocations {
            let mut store = MemoryStore::denying();
            let err = dispatch(invocation, &mut store, &AuthorizationGate::new(None), at(7, 12))
                .unwrap_err();
            assert!(matches!(err, BridgeError::AccessDenied(_)));
            assert_eq!(store.calls.get(), 0);
        }
    }
}
