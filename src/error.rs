//! Error types for policy service calls.
//!
//! Every failed call produces exactly one of three kinds. Callers branch on the
//! kind (or the variant) rather than on message text:
//!
//! - [`Error::InvalidInput`] - the request could not be formed; a caller-side defect.
//! - [`Error::RequestFailed`] - the transport failed, or the service answered with a
//!   status other than `200 OK`.
//! - [`Error::UnexpectedResponse`] - a `200 OK` response could not be read or parsed.
//!
//! Each variant keeps the underlying cause (if any) as its `source`, plus whatever
//! diagnostic context was available where it failed.

use crate::context::ContextError;
use http::StatusCode;
use std::error::Error as StdError;
use std::fmt;

/// Boxed, thread-safe error used for wrapped causes.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The main error type for policy service calls.
///
/// # Examples
///
/// ```no_run
/// use opaclient::{Client, Context, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::new("http://localhost:8181", [])?;
///
/// match client.get::<serde_json::Value>(&Context::background(), "/v1/data").await {
///     Ok(value) => println!("Decision: {}", value),
///     Err(Error::RequestFailed { status: Some(status), body, .. }) => {
///         eprintln!("Service answered {}: {:?}", status, body);
///     }
///     Err(Error::UnexpectedResponse { body, source, .. }) => {
///         eprintln!("Unreadable response {:?}: {:?}", body, source);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request itself could not be formed.
    ///
    /// Raised for an unusable method or address, an unserializable body, or an
    /// invalid construction option. Never caused by the remote party.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
        /// The underlying construction fault
        source: Option<BoxError>,
    },

    /// The call did not produce a successful response.
    ///
    /// Either the transport failed (no `status`, no `body`), or the service
    /// returned a status other than `200 OK`.
    #[error("request failed: {message}")]
    RequestFailed {
        /// Summary of the failure
        message: String,
        /// The HTTP status code, when a response was received
        status: Option<StatusCode>,
        /// The raw response body, when a response was received and readable
        body: Option<String>,
        /// The transport-level cause
        source: Option<BoxError>,
    },

    /// A `200 OK` response could not be read or decoded as JSON.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Summary of the failure
        message: String,
        /// The raw (possibly partial) response body
        body: Option<String>,
        /// The read or decode error
        source: Option<BoxError>,
    },
}

/// The category of an [`Error`], for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    RequestFailed,
    UnexpectedResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::RequestFailed => "request failed",
            ErrorKind::UnexpectedResponse => "unexpected response",
        };
        f.write_str(name)
    }
}

impl Error {
    pub(crate) fn invalid_input(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the kind of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaclient::{Error, ErrorKind};
    /// use http::StatusCode;
    ///
    /// let err = Error::RequestFailed {
    ///     message: "status code is not OK".to_string(),
    ///     status: Some(StatusCode::NOT_FOUND),
    ///     body: Some("not found".to_string()),
    ///     source: None,
    /// };
    ///
    /// assert_eq!(err.kind(), ErrorKind::RequestFailed);
    /// assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    /// assert_eq!(err.body(), Some("not found"));
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::RequestFailed { .. } => ErrorKind::RequestFailed,
            Error::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
        }
    }

    /// Returns the HTTP status code if the service answered with a non-200 status.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the raw response body attached to this error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::RequestFailed { body, .. } | Error::UnexpectedResponse { body, .. } => {
                body.as_deref()
            }
            Error::InvalidInput { .. } => None,
        }
    }

    /// Returns `true` if the call was cut short by its context or by a
    /// transport timeout.
    ///
    /// The whole `source` chain is inspected, so this also works when the
    /// cancellation is nested inside a transport error.
    pub fn is_canceled(&self) -> bool {
        let source = match self {
            Error::InvalidInput { source, .. }
            | Error::RequestFailed { source, .. }
            | Error::UnexpectedResponse { source, .. } => source,
        };
        let mut current = source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static));
        while let Some(err) = current {
            if err.downcast_ref::<ContextError>().is_some() {
                return true;
            }
            if let Some(err) = err.downcast_ref::<reqwest::Error>() {
                if err.is_timeout() {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }
}

/// A specialized `Result` type for policy service calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
