use serde::{Deserialize, Serialize};

use crate::types::FileAttributes;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Initiates a transfer of `length` bytes. Only valid with the upgrade flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendFileRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub length: u64,
}

/// Removes the blob stored under `file_handle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub file_handle: String,
}

/// Requests the attributes of the blob stored under `file_handle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsFileRequest {
    pub file_handle: String,
}

// ---------------------------------------------------------------------------
// Reply payloads
// ---------------------------------------------------------------------------

/// Handle allocated for an upgraded transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendFileReply {
    pub file_handle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteFileReply {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsFileReply {
    pub attributes: FileAttributes,
}
