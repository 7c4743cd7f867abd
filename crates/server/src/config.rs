use std::time::Duration;

use sendfile_protocol::constants::MAX_FILE_SIZE;

/// Responder policy.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest declared length a `SendFile` call may announce.
    pub max_file_size: u64,
    /// How long a control connection may sit idle between calls.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            idle_timeout: Duration::from_secs(60),
        }
    }
}
