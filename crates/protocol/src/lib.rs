//! Control-channel wire types for the sendfile service.
//!
//! A control connection carries NUL-terminated JSON messages: the caller
//! sends a [`Call`], the responder answers with a [`Reply`]. A `SendFile`
//! call may ask for the connection to be upgraded, after which the reply is
//! the last structured message on that connection and the raw transfer
//! takes over (see the `sendfile-data-channel` crate).

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

pub use constants::{ErrorKind, Method};
pub use envelope::{Call, ErrorDetail, Reply};
pub use types::{FileAttributes, ServiceInfo};
