//! Error taxonomy.
//!
//! Transport failures during extraction never appear here: each tier
//! swallows its own and reports a miss. Only failures that reach the
//! caller are typed.

use std::time::Duration;

use thiserror::Error;

/// The resolved manifest URL did not serve.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

/// Terminal outcome of a `/stream` request.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Every extraction tier came back empty.
    #[error("could not resolve stream (.m3u8) for {0}")]
    ResolutionExhausted(String),

    /// Resolution succeeded but the fresh manifest URL failed to proxy.
    #[error("failed to fetch remote .m3u8: {0}")]
    Proxy(#[from] ProxyError),
}

pub type Result<T> = std::result::Result<T, StreamError>;
