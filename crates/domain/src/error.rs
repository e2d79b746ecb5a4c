use crate::state::SessionState;

/// Errors surfaced by the messaging gateway.
///
/// `EndpointGone` is the one the router cares about: it means the staff-side
/// sub-channel was deleted out from under us and can be recreated.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("endpoint gone")]
    EndpointGone,

    #[error("rate limited")]
    RateLimited,

    #[error("gateway: {0}")]
    Other(String),
}

/// Shared error type used across all DeskRelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ticket {ticket_id} already has an active session")]
    SessionAlreadyActive { ticket_id: i64 },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session not active: {0}")]
    SessionInactive(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("store: {0}")]
    Store(String),

    #[error("template: {0}")]
    Template(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a delivery failure with this error is worth one retry after
    /// recreating the staff endpoint.
    pub fn is_endpoint_gone(&self) -> bool {
        matches!(self, Error::Gateway(GatewayError::EndpointGone))
    }
}
