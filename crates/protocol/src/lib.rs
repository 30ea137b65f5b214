// Wire types shared by the directory client and the collection endpoint

pub mod employee;
pub mod messages;

pub use {
    employee::{matches_name, Employee, NewEmployee},
    messages::{ClientMessage, ErrorKind, Reply, Request, ServerMessage},
};
