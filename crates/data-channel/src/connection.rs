//! A control connection with an explicit upgrade state.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use sendfile_protocol::{Call, Reply};

use crate::error::ChannelError;
use crate::wire::{read_message, write_message};

/// Phase of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Structured calls and replies.
    Control,
    /// Raw byte pipe. Terminal: there is no downgrade.
    Upgraded,
}

/// A duplex stream that speaks structured messages until it is upgraded.
///
/// Reads go through a buffer so bytes the peer sent right behind its last
/// structured message are not lost when the connection switches to the raw
/// phase; [`raw`](Self::raw) hands out that same buffered stream.
pub struct Connection<S> {
    stream: BufReader<S>,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            state: ConnectionState::Control,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_upgraded(&self) -> bool {
        self.state == ConnectionState::Upgraded
    }

    fn ensure_control(&self, operation: &str) -> Result<(), ChannelError> {
        match self.state {
            ConnectionState::Control => Ok(()),
            ConnectionState::Upgraded => Err(ChannelError::ProtocolViolation(format!(
                "{operation} on an upgraded connection"
            ))),
        }
    }

    /// Marks the connection as upgraded. Allowed exactly once.
    pub fn upgrade(&mut self) -> Result<(), ChannelError> {
        self.ensure_control("upgrade")?;
        self.state = ConnectionState::Upgraded;
        debug!("connection upgraded");
        Ok(())
    }

    /// Responder side: reads the next call.
    ///
    /// Returns `None` when the peer closed the connection between calls.
    pub async fn read_call(&mut self) -> Result<Option<Call>, ChannelError> {
        self.ensure_control("read call")?;
        read_message(&mut self.stream).await
    }

    /// Responder side: sends a reply and stays in control mode.
    pub async fn send_reply(&mut self, reply: &Reply) -> Result<(), ChannelError> {
        self.ensure_control("send reply")?;
        write_message(&mut self.stream, reply).await
    }

    /// Responder side: sends the last structured message of this connection
    /// and switches to the raw phase.
    pub async fn send_upgrade_reply(&mut self, reply: &Reply) -> Result<(), ChannelError> {
        if reply.is_error() {
            return Err(ChannelError::ProtocolViolation(
                "an error reply cannot upgrade a connection".into(),
            ));
        }
        self.send_reply(reply).await?;
        self.upgrade()
    }

    /// Initiator side: sends a call and waits for its reply.
    ///
    /// When the call carries the upgrade flag and the reply is a success,
    /// the connection is upgraded before returning. An error reply leaves
    /// it in control mode.
    pub async fn call(&mut self, call: &Call) -> Result<Reply, ChannelError> {
        self.ensure_control("call")?;
        write_message(&mut self.stream, call).await?;

        let reply: Reply = read_message(&mut self.stream)
            .await?
            .ok_or(ChannelError::ConnectionClosed)?;

        if call.upgrade && !reply.is_error() {
            self.upgrade()?;
        }
        Ok(reply)
    }

    /// The raw byte pipe. Only available once upgraded.
    pub fn raw(&mut self) -> Result<&mut BufReader<S>, ChannelError> {
        match self.state {
            ConnectionState::Upgraded => Ok(&mut self.stream),
            ConnectionState::Control => Err(ChannelError::ProtocolViolation(
                "raw access on a connection that was not upgraded".into(),
            )),
        }
    }

    /// Flushes and shuts down the write half.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
