use thiserror::Error;

use crate::cursor::CursorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Group,
    Message,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Message => "message",
        };
        f.write_str(name)
    }
}

/// Domain errors surfaced across the transport boundary. Bus filter errors
/// are deliberately absent: they are swallowed per subscriber and never
/// propagate to a publisher.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("malformed pagination cursor")]
    MalformedCursor,
    #[error("mutation partially applied: {0}")]
    PartialFailure(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: i64) -> Self {
        Error::NotFound { kind, id }
    }
}

impl From<CursorError> for Error {
    fn from(_: CursorError) -> Self {
        Error::MalformedCursor
    }
}
