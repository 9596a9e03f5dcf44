//! Basic-scheme credential encoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{GraphError, Result};

/// Produce an `Authorization` header value for the given credentials.
///
/// Deterministic, no I/O. Fails only when either input is empty, which the
/// protocol does not accept.
pub fn basic_auth(username: &str, password: &str) -> Result<String> {
    if username.is_empty() || password.is_empty() {
        return Err(GraphError::InvalidCredentials);
    }
    let token = BASE64.encode(format!("{username}:{password}"));
    Ok(format!("Basic {token}"))
}
