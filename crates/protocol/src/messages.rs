// WebSocket message types for client-server communication

use crate::employee::{Employee, NewEmployee};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations against the employee collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// List the collection, optionally filtered by a name substring
    List { name: Option<String> },

    /// Fetch one record
    Get { id: i64 },

    /// Create a record; the collection assigns the id
    Create { employee: NewEmployee },

    /// Replace the record with the same id
    Update { employee: Employee },

    /// Remove a record
    Delete { id: i64 },
}

/// Result of a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    /// Records in collection order
    Employees { employees: Vec<Employee> },

    /// A single record (get, create)
    Employee { employee: Employee },

    /// Acknowledgement for update and delete
    Done,

    /// The request failed
    Error { kind: ErrorKind, message: String },
}

impl Reply {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Reply::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Failure categories carried over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Request envelope sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub request_id: u64,
    pub request: Request,
}

/// Reply envelope sent from server to client.
/// Replies are matched by `request_id`; they may arrive in any order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub request_id: u64,
    pub reply: Reply,
}
