//! Control connections that upgrade into raw byte pipes.
//!
//! A [`Connection`] starts in [`ConnectionState::Control`] and carries
//! NUL-terminated JSON calls and replies. A single successful upgrade call
//! moves it to [`ConnectionState::Upgraded`]; from then on only raw bytes
//! flow, moved by the functions in [`copier`], and any structured call is
//! rejected with [`ChannelError::ProtocolViolation`].
//!
//! # Raw phase
//!
//! ```text
//! SENDER -> RECEIVER: [length bytes: payload, any chunking]
//! RECEIVER -> SENDER: [1 byte: ACK_BYTE]
//! ```
//!
//! No framing follows; both sides close the connection after the
//! acknowledgement round-trip.

pub mod address;
pub mod connection;
pub mod copier;
pub mod error;
pub mod wire;

pub use address::{Address, BoxStream, Listener, Stream};
pub use connection::{Connection, ConnectionState};
pub use error::ChannelError;

use std::time::Duration;

/// Timeout for establishing a transport connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
