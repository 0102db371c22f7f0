//! LDAP session errors

use std::fmt;

use futures::channel::mpsc::SendError;
use rasn::ber;
use rasn_ldap::{BindResponse, LdapResult, ResultCode};

use crate::{channel::ChannelError, filter::Rule};

pub type Result<T> = std::result::Result<T, Error>;

/// LDAP operation error as reported by the server
#[derive(Debug, Clone, PartialEq)]
pub struct OperationError {
    /// Result code
    pub result_code: ResultCode,
    /// Matched DN
    pub matched_dn: String,
    /// Diagnostic message
    pub diagnostic_message: String,
}

impl OperationError {
    /// Create an operation error with a given result code and diagnostic message
    pub fn new<S: AsRef<str>>(result_code: ResultCode, diagnostic_message: S) -> Self {
        Self {
            result_code,
            matched_dn: String::new(),
            diagnostic_message: diagnostic_message.as_ref().to_owned(),
        }
    }

    /// Server error string: the diagnostic message, or the result code name when the server sent none
    pub fn message(&self) -> String {
        if self.diagnostic_message.is_empty() {
            format!("{:?}", self.result_code)
        } else {
            self.diagnostic_message.clone()
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl From<BindResponse> for OperationError {
    fn from(r: BindResponse) -> Self {
        OperationError {
            result_code: r.result_code,
            matched_dn: String::from_utf8_lossy(&r.matched_dn).into_owned(),
            diagnostic_message: String::from_utf8_lossy(&r.diagnostic_message).into_owned(),
        }
    }
}

impl From<LdapResult> for OperationError {
    fn from(r: LdapResult) -> Self {
        OperationError {
            result_code: r.result_code,
            matched_dn: String::from_utf8_lossy(&r.matched_dn).into_owned(),
            diagnostic_message: String::from_utf8_lossy(&r.diagnostic_message).into_owned(),
        }
    }
}

/// Capacity bound checked by the attribute-set builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Number of attributes in one request
    Attributes,
    /// Total number of values across all attributes
    Values,
    /// Number of value cells, including one terminator per attribute
    Cells,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Attributes => f.write_str("attributes"),
            Bound::Values => f.write_str("values"),
            Bound::Cells => f.write_str("value cells"),
        }
    }
}

fn batch_suffix(batch: &Option<usize>) -> String {
    batch.map(|b| format!(" (modify batch {})", b)).unwrap_or_default()
}

fn value_location(attribute: &Option<String>, position: &Option<usize>) -> String {
    match (attribute, position) {
        (Some(a), Some(p)) => format!(" for attribute '{}' at position {}", a, p),
        (Some(a), None) => format!(" for attribute '{}'", a),
        (None, Some(p)) => format!(" at position {}", p),
        (None, None) => String::new(),
    }
}

/// LDAP session errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Bind failed: {0}")]
    BindFailed(OperationError),
    #[error("{error}{}", batch_suffix(.batch))]
    ServerError {
        error: OperationError,
        /// 1-based index of the rejected modify batch
        batch: Option<usize>,
    },
    #[error("Too many {bound}: {count} exceeds limit of {limit}")]
    BoundsExceeded { bound: Bound, count: usize, limit: usize },
    #[error("Invalid value type '{found}'{}", value_location(.attribute, .position))]
    InvalidValueType {
        attribute: Option<String>,
        /// 1-based position inside a value list
        position: Option<usize>,
        found: &'static str,
    },
    #[error("Invalid modify operation '{marker}' in batch {batch}")]
    InvalidModifyOperation { batch: usize, marker: String },
    #[error("Result timeout expired")]
    ResultTimeout,
    #[error("Result error: {0}")]
    ResultError(String),
    #[error("Unexpected message type: {0}")]
    UnexpectedMessageType(String),
    #[error("Search is closed")]
    SearchClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0:?}")]
    AsnDecode(ber::de::Error),
    #[error("{0:?}")]
    AsnEncode(ber::enc::Error),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    InvalidFilter(#[from] Box<pest::error::Error<Rule>>),
    #[error("Invalid message id")]
    InvalidMessageId,
    #[error("Invalid response")]
    InvalidResponse,
}

impl Error {
    /// Wrap a server-side rejection
    pub fn server(error: OperationError) -> Self {
        Error::ServerError { error, batch: None }
    }

    /// 1-based index of the modify batch this error is attributed to, if any
    pub fn batch(&self) -> Option<usize> {
        match self {
            Error::ServerError { batch, .. } => *batch,
            Error::InvalidModifyOperation { batch, .. } => Some(*batch),
            _ => None,
        }
    }

    /// Server error string for server-side rejections
    pub fn server_message(&self) -> Option<String> {
        match self {
            Error::ServerError { error, .. } | Error::BindFailed(error) => Some(error.message()),
            _ => None,
        }
    }

    pub(crate) fn with_batch(self, index: usize) -> Self {
        match self {
            Error::ServerError { error, .. } => Error::ServerError {
                error,
                batch: Some(index),
            },
            Error::InvalidModifyOperation { marker, .. } => Error::InvalidModifyOperation { batch: index, marker },
            other => other,
        }
    }

    pub(crate) fn into_result_error(self) -> Self {
        match self {
            e @ (Error::ResultError(_) | Error::ResultTimeout) => e,
            other => Error::ResultError(other.to_string()),
        }
    }
}

impl From<ber::de::Error> for Error {
    fn from(e: ber::de::Error) -> Self {
        Error::AsnDecode(e)
    }
}

impl From<ber::enc::Error> for Error {
    fn from(e: ber::enc::Error) -> Self {
        Error::AsnEncode(e)
    }
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(e: pest::error::Error<Rule>) -> Self {
        Error::InvalidFilter(Box::new(e))
    }
}
