//! Transport addresses: `tcp:<host>:<port>` and `unix:<path>`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::CONNECT_TIMEOUT;
use crate::error::ChannelError;

/// A duplex byte stream usable as a connection transport.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Type-erased transport stream.
pub type BoxStream = Box<dyn Stream>;

/// Where a responder listens and an initiator connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// `tcp:127.0.0.1:12345`
    Tcp(String),
    /// `unix:/run/sendfile.sock`
    Unix(PathBuf),
}

impl FromStr for Address {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("tcp:") {
            if rest.is_empty() {
                return Err(ChannelError::InvalidAddress(format!("missing host: {s}")));
            }
            return Ok(Address::Tcp(rest.to_string()));
        }
        if let Some(rest) = s.strip_prefix("unix:") {
            if rest.is_empty() {
                return Err(ChannelError::InvalidAddress(format!("missing path: {s}")));
            }
            return Ok(Address::Unix(PathBuf::from(rest)));
        }
        Err(ChannelError::InvalidAddress(format!(
            "expected tcp:<host>:<port> or unix:<path>, got {s}"
        )))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(addr) => write!(f, "tcp:{addr}"),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl Address {
    /// Opens a fresh transport connection.
    pub async fn connect(&self) -> Result<BoxStream, ChannelError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, self.open())
            .await
            .map_err(|_| ChannelError::Timeout)??;
        debug!(address = %self, "connected");
        Ok(stream)
    }

    async fn open(&self) -> Result<BoxStream, ChannelError> {
        match self {
            Address::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Address::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            Address::Unix(_) => Err(unix_unsupported()),
        }
    }
}

/// A bound listener for either transport.
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl Listener {
    /// Binds `address`. A stale unix socket file at the path is replaced.
    pub async fn bind(address: &Address) -> Result<Self, ChannelError> {
        let listener = match address {
            Address::Tcp(addr) => Listener::Tcp(TcpListener::bind(addr.as_str()).await?),
            #[cfg(unix)]
            Address::Unix(path) => {
                remove_stale_socket(path).await?;
                let listener = tokio::net::UnixListener::bind(path)?;
                Listener::Unix {
                    listener,
                    path: path.clone(),
                }
            }
            #[cfg(not(unix))]
            Address::Unix(_) => return Err(unix_unsupported()),
        };

        info!(address = %listener.local_address()?, "listener bound");
        Ok(listener)
    }

    /// The bound address; reports the OS-assigned port for `tcp:...:0`.
    pub fn local_address(&self) -> Result<Address, ChannelError> {
        match self {
            Listener::Tcp(l) => Ok(Address::Tcp(l.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(Address::Unix(path.clone())),
        }
    }

    /// Accepts the next connection and a printable peer description.
    pub async fn accept(&self) -> Result<(BoxStream, String), ChannelError> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                stream.set_nodelay(true)?;
                let stream: BoxStream = Box::new(stream);
                Ok((stream, peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                let stream: BoxStream = Box::new(stream);
                Ok((stream, format!("unix:{}", path.display())))
            }
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(unix)]
async fn remove_stale_socket(path: &std::path::Path) -> Result<(), ChannelError> {
    use std::os::unix::fs::FileTypeExt;

    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(path = %path.display(), "removing stale socket");
            tokio::fs::remove_file(path).await?;
            Ok(())
        }
        Ok(_) => Err(ChannelError::InvalidAddress(format!(
            "{} exists and is not a socket",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn unix_unsupported() -> ChannelError {
    ChannelError::InvalidAddress("unix sockets are not supported on this platform".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn parse_tcp_address() {
        let addr: Address = "tcp:127.0.0.1:12345".parse().unwrap();
        assert_eq!(addr, Address::Tcp("127.0.0.1:12345".into()));
        assert_eq!(addr.to_string(), "tcp:127.0.0.1:12345");
    }

    #[test]
    fn parse_unix_address() {
        let addr: Address = "unix:/tmp/sendfile".parse().unwrap();
        assert_eq!(addr, Address::Unix(PathBuf::from("/tmp/sendfile")));
        assert_eq!(addr.to_string(), "unix:/tmp/sendfile");
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        assert!("http://localhost".parse::<Address>().is_err());
        assert!("/tmp/sendfile".parse::<Address>().is_err());
        assert!("tcp:".parse::<Address>().is_err());
        assert!("unix:".parse::<Address>().is_err());
    }

    #[tokio::test]
    async fn tcp_listener_reports_assigned_port() {
        let listener = Listener::bind(&"tcp:127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let Address::Tcp(bound) = listener.local_address().unwrap() else {
            panic!("expected tcp address");
        };
        assert!(!bound.ends_with(":0"));
    }

    #[tokio::test]
    async fn tcp_connect_and_accept() {
        let listener = Listener::bind(&"tcp:127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let address = listener.local_address().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _peer) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut client = address.connect().await.unwrap();
        client.write_all(b"ping").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::Unix(dir.path().join("sendfile.sock"));

        let first = Listener::bind(&address).await.unwrap();
        // Simulate a crashed server: the socket file outlives the listener.
        std::mem::forget(first);

        let second = Listener::bind(&address).await.unwrap();
        assert_eq!(second.local_address().unwrap(), address);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_refuses_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-socket");
        std::fs::write(&path, b"data").unwrap();

        let result = Listener::bind(&Address::Unix(path)).await;
        assert!(matches!(result, Err(ChannelError::InvalidAddress(_))));
    }
}
