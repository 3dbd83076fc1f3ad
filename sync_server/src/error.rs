//! Error taxonomy for webhook ingestion and reconciliation.

use thiserror::Error;

/// An inbound payload that cannot be reconciled.
///
/// Raised after the raw payload has been persisted to the ledger, so the
/// delivery is still recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Data was malformed, could not be parsed as JSON")]
    DataMalformed,
    #[error("Data did not contain an integer ticket `id`")]
    NoTicketId,
}

impl ValidationError {
    /// Stable code for callers that render their own text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataMalformed => "data_malformed",
            Self::NoTicketId => "data_no_ticket_id",
        }
    }
}

/// Failures talking to the Zendesk API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// 422 with a `DuplicateValue` detail, e.g. creating a user whose
    /// email or external id is already taken.
    #[error("remote rejected duplicate value: {0}")]
    Duplicate(String),
    #[error("remote validation failed: {0}")]
    Validation(String),
    #[error("remote resource not found: {0}")]
    NotFound(String),
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote response could not be decoded: {0}")]
    Decode(String),
    /// A paginated listing was still advertising pages past the cap.
    #[error("remote listing exceeded {max_pages} pages, next was {url}")]
    TooManyPages { url: String, max_pages: usize },
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A closed-enumeration column received a value outside its set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
