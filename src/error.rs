use thiserror::Error;

/// Terminal failures of a single bridge invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("expected RFC3339 timestamp like 2025-05-07T00:00:00Z, got '{0}'")]
    InvalidTimestamp(String),

    #[error("start ({start}) must be earlier than end ({end})")]
    InvalidRange { start: String, end: String },

    #[error("missing required parameter {0}")]
    MissingParameter(&'static str),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("conflicting modes {0:?}; choose one of --delete-id, --create-json, --update-json or --start/--end")]
    ConflictingModes(Vec<&'static str>),

    #[error("no event found with id '{0}'")]
    RecordNotFound(String),

    #[error("calendar access not granted: {0}")]
    AccessDenied(String),

    #[error("calendar store failure: {0}")]
    StoreFailure(String),
}

impl BridgeError {
    /// Process exit status reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidTimestamp(_)
            | Self::InvalidRange { .. }
            | Self::MissingParameter(_)
            | Self::MalformedPayload(_)
            | Self::ConflictingModes(_) => 2,
            Self::RecordNotFound(_) => 3,
            Self::AccessDenied(_) => 4,
            Self::StoreFailure(_) => 5,
        }
    }
}

impl From<crate::store::StoreError> for BridgeError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::StoreFailure(err.to_string())
    }
}
