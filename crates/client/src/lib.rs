// Employee directory client: keeps an in-memory directory and a live search
// consistent with the remote employee collection

pub mod config;
pub mod directory;
pub mod notifications;
pub mod remote;
pub mod search;
pub mod transport;

pub use {
    config::ClientConfig,
    directory::{Draft, DirectorySync, EmployeeList, SyncError, SyncResult},
    notifications::{Notification, NotificationLog},
    remote::{RemoteCollection, RemoteError, RemoteResult},
    search::{IncrementalSearch, SearchPhase, SearchState, Token},
    transport::WsCollection,
};
