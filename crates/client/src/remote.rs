//! Abstract access to the remote employee collection.

use async_trait::async_trait;
use protocol::{Employee, ErrorKind, NewEmployee};
use thiserror::Error;

/// Failures of a remote collection call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The request did not reach the collection or did not complete.
    #[error("transport error: {0}")]
    Transport(String),

    /// The referenced id does not exist; the local view is stale.
    #[error("employee {0} not found")]
    NotFound(i64),

    /// The collection rejected the payload.
    #[error("rejected by collection: {0}")]
    Invalid(String),
}

impl RemoteError {
    /// Map a wire error onto the local taxonomy. `id` is the record the
    /// request referred to, if any.
    pub fn from_wire(kind: ErrorKind, message: String, id: Option<i64>) -> Self {
        match (kind, id) {
            (ErrorKind::NotFound, Some(id)) => RemoteError::NotFound(id),
            (ErrorKind::NotFound, None) => RemoteError::Invalid(message),
            (ErrorKind::Invalid, _) => RemoteError::Invalid(message),
            (ErrorKind::Internal, _) => RemoteError::Transport(message),
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// CRUD over a collection keyed by numeric id. Owns no state of its own;
/// every call is a suspension point.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Records in collection order, optionally filtered by a
    /// case-insensitive name substring.
    async fn list(&self, filter: Option<&str>) -> RemoteResult<Vec<Employee>>;

    async fn get(&self, id: i64) -> RemoteResult<Employee>;

    /// Create a record; the collection assigns the id.
    async fn create(&self, employee: NewEmployee) -> RemoteResult<Employee>;

    /// Replace the stored record with the same id.
    async fn update(&self, employee: &Employee) -> RemoteResult<()>;

    /// Not idempotent: a second delete of the same id is `NotFound`.
    async fn delete(&self, id: i64) -> RemoteResult<()>;
}
