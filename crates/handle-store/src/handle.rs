//! Handle generation and syntax checks.

use rand::Rng;

/// Prefix of every allocated handle.
pub const HANDLE_PREFIX: &str = "sendfile";

/// Random bytes per handle (16 hex characters).
const HANDLE_RANDOM_BYTES: usize = 8;

/// Generates a fresh handle: the prefix followed by random hex.
pub fn generate_handle() -> String {
    let mut bytes = [0u8; HANDLE_RANDOM_BYTES];
    rand::thread_rng().fill(&mut bytes);
    format!("{HANDLE_PREFIX}{}", hex::encode(bytes))
}

/// Checks that `handle` can only ever name a direct child of the cache root.
///
/// Rejects path separators, the `.`/`..` aliases, NUL bytes and the empty
/// string. This runs before any filesystem access derived from caller input.
pub fn validate_handle_syntax(handle: &str) -> Result<(), String> {
    if handle.is_empty() {
        return Err("empty handle".into());
    }
    if handle == "." || handle == ".." {
        return Err(format!("reserved name: {handle}"));
    }
    if handle.contains('/') || handle.contains(std::path::MAIN_SEPARATOR) {
        return Err(format!("path separator in handle: {handle}"));
    }
    if handle.contains('\0') {
        return Err("NUL byte in handle".into());
    }
    Ok(())
}
