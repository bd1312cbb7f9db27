//! Error types for the linkprobe crate.
//!
//! Probe and lookup errors never leave a test run: they are kept on the
//! [`ProbeResult`](crate::probe::ProbeResult) for logging and collapsed to
//! `DEAD` / `"-"` when the table row is built. Only [`Error`] reaches callers.

use thiserror::Error;

/// Why a single TCP liveness probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// DNS resolution of the host failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    /// The host resolved, but to no usable address.
    #[error("{0} resolved to no address")]
    NoAddress(String),
    /// The connect attempt did not finish within the probe timeout.
    #[error("connect to {0} timed out")]
    Timeout(String),
    /// The connect attempt was refused or otherwise failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a geo/provider lookup failed.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("lookup response unreadable: {0}")]
    Body(#[from] reqwest::Error),
    #[error("lookup service answered {0}")]
    Status(reqwest::StatusCode),
    #[error("lookup response has neither provider nor country")]
    MissingFields,
}

/// Failure of the upstream template storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage answered {0}")]
    Status(reqwest::StatusCode),
    #[error("template {0} not found")]
    NotFound(String),
    #[error("stored content is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("storage response is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to the caller of a test run.
#[derive(Debug, Error)]
pub enum Error {
    /// The lookup HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    /// The configuration template could not be fetched.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The configuration template is not a valid template document.
    #[error("invalid config template: {0}")]
    Template(#[from] serde_json::Error),
}
