use std::{
    cell::Cell,
    sync::mpsc::{self, RecvTimeoutError},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    error::BridgeError,
    store::{AccessGrant, AccessStatus, CalendarStore},
};

/// Turns the store's callback-based access request into one blocking call.
///
/// `ensure_access` blocks the calling thread until the store's completion
/// fires, which may take as long as the host's permission flow takes. With
/// no timeout configured the wait is unbounded.
pub struct AuthorizationGate {
    timeout: Option<Duration>,
    granted: Cell<bool>,
}

impl AuthorizationGate {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            granted: Cell::new(false),
        }
    }

    pub fn ensure_access<S: CalendarStore + ?Sized>(&self, store: &S) -> Result<(), BridgeError> {
        if self.granted.get() {
            return Ok(());
        }
        if store.authorization_status() == AccessStatus::Authorized {
            debug!("calendar access already authorized");
            self.granted.set(true);
            return Ok(());
        }

        // One signal, one wait.
        let (tx, rx) = mpsc::sync_channel(1);
        debug!("requesting calendar access");
        store.request_access(Box::new(move |grant| {
            let _ = tx.send(grant);
        }));

        let grant = match self.timeout {
            Some(limit) => rx.recv_timeout(limit).map_err(|err| match err {
                RecvTimeoutError::Timeout => BridgeError::AccessDenied(format!(
                    "no answer within {}",
                    humantime::format_duration(limit)
                )),
                RecvTimeoutError::Disconnected => abandoned(),
            })?,
            None => rx.recv().map_err(|_| abandoned())?,
        };

        match grant {
            AccessGrant::Granted => {
                info!("calendar access granted");
                self.granted.set(true);
                Ok(())
            }
            AccessGrant::Denied(reason) => {
                let reason = reason.unwrap_or_else(|| "user denied".to_string());
                warn!(%reason, "calendar access denied");
                Err(BridgeError::AccessDenied(reason))
            }
        }
    }
}

fn abandoned() -> BridgeError {
    BridgeError::AccessDenied("access request ended without an answer".to_string())
}
