//! Error types for the Marketing API client.
//!
//! # Design
//! Every failure an invocation can end with is one variant of `Error`, and
//! each variant is rendered once at the top level. `Api` keeps the status and
//! body of a non-2xx response untouched because the server's error payload is
//! the authoritative diagnosis. `PollTimeout` is kept apart from
//! `UploadPhase` since the asset may still finish processing later.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for failed invocations.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when an upload finished but processing was not confirmed.
pub const EXIT_UNKNOWN_OUTCOME: i32 = 3;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing token, unusable base URL and similar setup problems.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Parameters could not be turned into a Rest.li query. Raised before any
    /// network call.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Unknown resource or operation, or a path placeholder with no value.
    #[error("{0}")]
    Catalog(String),

    /// The file reference could not be opened or read.
    #[error("file source error: {0}")]
    Source(String),

    /// Connection-level failure that outlived the retry budget.
    #[error("transport error after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Api {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },

    /// A 2xx response that lacks something the protocol requires.
    #[error("unexpected response: {0}")]
    Response(String),

    /// One step of the asset upload failed.
    #[error("{phase} phase failed{}: {source}", upload_context(.owner, .asset, .chunk))]
    UploadPhase {
        phase: UploadPhase,
        owner: String,
        asset: Option<String>,
        chunk: Option<usize>,
        source: Box<Error>,
    },

    /// Processing was not confirmed before polling stopped.
    #[error("asset {asset} still processing, not confirmed ({reason})")]
    PollTimeout { asset: String, reason: PollStop },

    #[error("upload state machine: {0}")]
    State(#[from] InvalidTransition),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::PollTimeout { .. } => EXIT_UNKNOWN_OUTCOME,
            _ => EXIT_FAILURE,
        }
    }

    /// HTTP status of an `Api` error, looking through upload phase wrappers.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::UploadPhase { source, .. } => source.api_status(),
            _ => None,
        }
    }
}

fn upload_context(owner: &str, asset: &Option<String>, chunk: &Option<usize>) -> String {
    let mut context = format!(" for owner {owner}");
    if let Some(asset) = asset {
        context.push_str(&format!(", asset {asset}"));
    }
    if let Some(chunk) = chunk {
        context.push_str(&format!(", chunk {chunk}"));
    }
    context
}

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Connection resets, timeouts and lookup failures may succeed on a later
    /// attempt. Malformed requests never will.
    pub retryable: bool,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Step of the upload pipeline an `UploadPhase` error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Register,
    Upload,
    Finalize,
    Poll,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UploadPhase::Register => "register",
            UploadPhase::Upload => "upload",
            UploadPhase::Finalize => "finalize",
            UploadPhase::Poll => "poll",
        })
    }
}

/// Why polling stopped before the asset became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStop {
    TimedOut { attempts: u32 },
    Cancelled,
}

impl fmt::Display for PollStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollStop::TimedOut { attempts } => write!(f, "gave up after {attempts} status checks"),
            PollStop::Cancelled => f.write_str("interrupted"),
        }
    }
}

/// Rejected upload state machine step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} in state {from}")]
pub struct InvalidTransition {
    pub from: String,
    pub event: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_has_distinct_exit_code() {
        let err = Error::PollTimeout {
            asset: "urn:li:video:C5F10".to_string(),
            reason: PollStop::TimedOut { attempts: 100 },
        };
        assert_eq!(err.exit_code(), EXIT_UNKNOWN_OUTCOME);
        assert_eq!(Error::Cancelled.exit_code(), EXIT_FAILURE);
        assert!(err.to_string().contains("not confirmed"));
    }

    #[test]
    fn upload_phase_message_names_chunk() {
        let err = Error::UploadPhase {
            phase: UploadPhase::Upload,
            owner: "urn:li:organization:5".to_string(),
            asset: Some("urn:li:video:C5F10".to_string()),
            chunk: Some(3),
            source: Box::new(Error::Api {
                status: 500,
                headers: Vec::new(),
                body: "boom".to_string(),
            }),
        };
        let message = err.to_string();
        assert_eq!(
            message,
            concat!(
                "upload phase failed for owner urn:li:organization:5, ",
                "asset urn:li:video:C5F10, chunk 3: HTTP 500: boom"
            )
        );
        assert_eq!(err.api_status(), Some(500));
    }

    #[test]
    fn transport_error_reports_attempts() {
        let err = Error::Transport {
            attempts: 3,
            source: TransportError::transient("connection reset"),
        };
        assert_eq!(err.to_string(), "transport error after 3 attempt(s): connection reset");
    }
}
