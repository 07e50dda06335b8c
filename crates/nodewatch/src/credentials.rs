//! Bearer token lookup.
//!
//! The token is read on every reporting call, so a token written while the
//! agent runs is picked up without a restart. A missing token is a normal
//! state, not an error.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

pub trait CredentialSource: Send + Sync {
    /// Current bearer token, if any
    fn token(&self) -> Option<String>;
}

/// Token stored as the whole content of a file
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for TokenFile {
    fn token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read token from {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// Fixed token, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}
