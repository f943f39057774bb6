//! Error types for the adapter layer
//!
//! Every failure carries its [`ErrorKind`] structurally. The kind of an HTTP
//! failure is decided once, where the transport result is classified
//! (see [`crate::transport::decode`]), and is never re-derived from message
//! text afterwards.

use std::fmt;
use std::io;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for the adapter layer
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The authenticated principal has no organizations
    #[error("No organizations found for the current user")]
    NoOrganizations,

    /// No project was supplied and fixed-project mode is not active
    #[error("No current project configured; pass a project id explicitly")]
    NoCurrentProject,

    /// Project id is not in the organization's project list
    #[error("Project with id {0} not found")]
    ProjectNotFound(String),

    /// Generic lookup miss (unknown tool, unknown entity)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filter key is not a filterable field of the target project
    #[error("Invalid filter key: {0}")]
    InvalidFilterKey(String),

    /// Entity key does not have the expected shape
    #[error("Invalid key format: {0}")]
    InvalidEntityKey(String),

    /// Tool arguments failed to deserialize
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Other request validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend answered with a non-2xx status
    #[error("API returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        message: String,
    },

    /// Request could not be sent or the response could not be read
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered 2xx but the body did not decode
    #[error("Malformed response body (status {status}): {message}")]
    MalformedBody {
        /// HTTP status code (always 2xx)
        status: u16,
        /// Decoder message
        message: String,
    },

    /// Post-write reconciliation found the entity in a different state
    #[error("Update could not be verified: {}", format_mismatches(.0))]
    VerificationFailed(Vec<FieldMismatch>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification exposed to the dispatch layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing organization or project context
    Configuration,
    /// Unknown id or key
    NotFound,
    /// Bad filter key, entity key, arguments or URL
    Validation,
    /// Non-2xx status or connectivity failure
    Transport,
    /// 2xx with an undecodable body
    ParseFailure,
    /// Post-write reconciliation mismatch
    VerificationFailure,
    /// Anything else
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::ParseFailure => "parse_failure",
            Self::VerificationFailure => "verification_failure",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A single field whose post-write value differs from the intended one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMismatch {
    /// Field path (dot separated)
    pub field: String,
    /// Value the caller asked for
    pub expected: Value,
    /// Value found on the re-fetched entity (`None` when absent)
    pub actual: Option<Value>,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(f, "{} expected {} but was {}", self.field, self.expected, actual),
            None => write!(f, "{} expected {} but was absent", self.field, self.expected),
        }
    }
}

fn format_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Build an HTTP status error, truncating the body so it never floods logs
    pub fn http(status: u16, body: &str) -> Self {
        Self::Http {
            status,
            message: body.chars().take(500).collect(),
        }
    }

    /// Structural classification of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::NoOrganizations | Self::NoCurrentProject => {
                ErrorKind::Configuration
            }
            Self::ProjectNotFound(_) | Self::NotFound(_) | Self::Http { status: 404, .. } => {
                ErrorKind::NotFound
            }
            Self::InvalidFilterKey(_)
            | Self::InvalidEntityKey(_)
            | Self::InvalidArguments(_)
            | Self::InvalidUrl(_)
            | Self::Validation(_) => ErrorKind::Validation,
            Self::Http { .. } | Self::Request(_) => ErrorKind::Transport,
            Self::MalformedBody { .. } => ErrorKind::ParseFailure,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailure,
            Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status attached to this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::MalformedBody { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation => rpc_codes::INVALID_PARAMS,
            ErrorKind::NotFound => -32001,
            ErrorKind::Configuration => -32002,
            ErrorKind::Transport | ErrorKind::ParseFailure | ErrorKind::VerificationFailure => {
                rpc_codes::SERVER_ERROR_START
            }
            ErrorKind::Internal => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
}
