use serde::{Deserialize, Serialize};

/// Interface name served by the sendfile responder.
pub const INTERFACE: &str = "org.example.sendfile";

/// Interface name of the introspection methods.
pub const SERVICE_INTERFACE: &str = "org.varlink.service";

/// Default upper bound for a declared transfer length (10 MB).
pub const MAX_FILE_SIZE: u64 = 10_000_000;

/// Chunk size used by both sides of the raw transfer phase.
pub const CHUNK_SIZE: usize = 4096;

/// Acknowledgement byte written by the receiver after a complete transfer.
pub const ACK_BYTE: u8 = 0x0A;

/// Terminator written after every structured message.
pub const MESSAGE_TERMINATOR: u8 = 0x00;

/// Maximum encoded size of a single structured message (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Methods understood by the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Initiates a transfer; must be called with the upgrade flag.
    SendFile,
    /// Removes a stored blob.
    DeleteFile,
    /// Returns the attributes of a stored blob.
    LsFile,
    /// Service introspection.
    GetInfo,
}

impl Method {
    /// All methods, in dispatch order.
    pub const ALL: [Method; 4] = [
        Method::SendFile,
        Method::DeleteFile,
        Method::LsFile,
        Method::GetInfo,
    ];

    /// Fully qualified method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::SendFile => "org.example.sendfile.SendFile",
            Method::DeleteFile => "org.example.sendfile.DeleteFile",
            Method::LsFile => "org.example.sendfile.LsFile",
            Method::GetInfo => "org.varlink.service.GetInfo",
        }
    }

    /// Looks up a method by its fully qualified name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of error kinds a responder can reply with.
///
/// Callers match on the kind instead of inspecting error types, e.g. a
/// second `DeleteFile` on the same handle is `InvalidFileHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "org.example.sendfile.FileTooBig")]
    FileTooBig,
    #[serde(rename = "org.example.sendfile.FileCreate")]
    FileCreate,
    #[serde(rename = "org.example.sendfile.InvalidFileHandle")]
    InvalidFileHandle,
    #[serde(rename = "org.example.sendfile.UpgradeRequired")]
    UpgradeRequired,
    /// An underlying filesystem error, message carried verbatim.
    #[serde(rename = "org.example.sendfile.IoError")]
    IoError,
    #[serde(rename = "org.varlink.service.MethodNotFound")]
    MethodNotFound,
    #[serde(rename = "org.varlink.service.InvalidParameter")]
    InvalidParameter,
    /// Any error name this build does not know about.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::FileTooBig => "file too big",
            ErrorKind::FileCreate => "file could not be created",
            ErrorKind::InvalidFileHandle => "invalid file handle",
            ErrorKind::UpgradeRequired => "upgrade required",
            ErrorKind::IoError => "I/O error",
            ErrorKind::MethodNotFound => "method not found",
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}
