//! Bilibili session cookie providers

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading the session cookie
#[derive(Error, Debug)]
pub enum SessionError {
    /// No cookie has been configured
    #[error("bilibili cookie is not configured")]
    NotConfigured,
    /// The cookie file could not be read
    #[error("cannot read cookie file {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// The cookie file is not valid JSON
    #[error("malformed cookie file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Source of the session cookie used by authenticated requests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Load the current cookie header value
    async fn load(&self) -> Result<String, SessionError>;
}

#[derive(Deserialize)]
struct CookieFile {
    #[serde(default)]
    bilibili_cookie: String,
}

/// Reads `{"bilibili_cookie": "..."}` from a JSON file on every load, so the
/// cookie can be rotated without a restart
pub struct CookieFileSession {
    path: PathBuf,
}

impl CookieFileSession {
    /// Provider reading `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionProvider for CookieFileSession {
    async fn load(&self) -> Result<String, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotConfigured)
            }
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let file: CookieFile = serde_json::from_slice(&bytes)?;
        let cookie = file.bilibili_cookie.trim();
        if cookie.is_empty() {
            return Err(SessionError::NotConfigured);
        }
        Ok(cookie.to_string())
    }
}

/// Cookie supplied directly through settings
pub struct StaticSession {
    cookie: String,
}

impl StaticSession {
    /// Provider returning `cookie`
    #[must_use]
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn load(&self) -> Result<String, SessionError> {
        if self.cookie.trim().is_empty() {
            return Err(SessionError::NotConfigured);
        }
        Ok(self.cookie.clone())
    }
}
