//! Fault taxonomy for the poller.
//!
//! Every variant is fatal to the running process: the loop never
//! recovers locally (unless per-entity retry is switched on), so these
//! exist to make the log line at exit say *which* boundary failed.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubStatsError>;

#[derive(Debug, Error)]
pub enum HubStatsError {
    /// Malformed config file, or a setting that could not be parsed when used.
    #[error("config error: {0}")]
    Config(String),

    /// Registry or store unreachable, or a non-success HTTP status.
    #[error("network error ({url}): {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A registry response is missing a field or carries the wrong type.
    #[error("schema error ({context}): {message}")]
    Schema { context: String, message: String },

    /// The metrics store rejected a bucket operation or a write.
    #[error("store error: {operation} returned {status}: {body}")]
    Store {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

impl HubStatsError {
    /// Classify a reqwest failure: body decode problems are schema faults,
    /// everything else (connect, status, timeout) is a network fault.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Schema {
                context: url.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub fn schema(context: impl Into<String>, err: serde_json::Error) -> Self {
        Self::Schema {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Short tag used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Network { .. } => "network",
            Self::Schema { .. } => "schema",
            Self::Store { .. } => "store",
        }
    }
}
