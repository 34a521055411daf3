//! Responses as returned by a [`Transport`](crate::Transport).
//!
//! The body is a single-read stream. Reading it consumes the [`ResponseBody`],
//! and dropping the body releases the underlying connection, so a body can be
//! read at most once and is released exactly once.

use crate::error::BoxError;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use std::fmt;

/// A response received from the transport.
///
/// # Examples
///
/// ```
/// # use opaclient::{Response, ResponseBody};
/// # use http::{HeaderMap, StatusCode};
/// # #[tokio::main]
/// # async fn main() {
/// let response = Response::new(StatusCode::OK, HeaderMap::new(), r#"{"ok":true}"#);
///
/// assert_eq!(response.status, StatusCode::OK);
/// let raw = response.body.read_to_end().await.unwrap();
/// assert_eq!(raw, br#"{"ok":true}"#);
/// # }
/// ```
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The response body, readable once.
    pub body: ResponseBody,
}

impl Response {
    /// Creates a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<ResponseBody>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A single-read response body.
pub struct ResponseBody {
    stream: BoxStream<'static, Result<Bytes, BoxError>>,
}

impl ResponseBody {
    /// Wraps a stream of body chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }

    /// A body with no content.
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// Reads the remaining body to the end and releases it.
    ///
    /// # Errors
    ///
    /// On a failed chunk, returns a [`ReadError`] with everything read before
    /// the failure.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>, ReadError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.stream.next().await {
            match chunk {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(source) => {
                    return Err(ReadError {
                        partial: buf,
                        source,
                    })
                }
            }
        }
        Ok(buf)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_stream(stream::once(async move { Ok(bytes) }))
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// A body read that failed part way through.
#[derive(thiserror::Error, Debug)]
#[error("failed to read response body after {} bytes: {source}", .partial.len())]
pub struct ReadError {
    /// The bytes read before the failure.
    pub partial: Vec<u8>,

    /// The underlying stream error.
    pub source: BoxError,
}
