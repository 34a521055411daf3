//! The network seam.
//!
//! A [`Transport`] takes one [`Request`] and returns one [`Response`] or an
//! error. It is the only place the client performs I/O, which lets tests swap
//! the real network for a deterministic fake.

use crate::{
    error::BoxError,
    request::Request,
    response::{Response, ResponseBody},
    Error, Result,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::Duration;

/// Issues a single request.
///
/// Implementations must honor `request.context`: once it is canceled or its
/// deadline passes, `issue` should return promptly with an error. The client
/// never retries, so each call to `issue` is one attempt.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use opaclient::{BoxError, Request, Response, Transport};
/// use http::{HeaderMap, StatusCode};
///
/// struct AlwaysAllow;
///
/// #[async_trait]
/// impl Transport for AlwaysAllow {
///     async fn issue(&self, _request: Request) -> Result<Response, BoxError> {
///         Ok(Response::new(StatusCode::OK, HeaderMap::new(), r#"{"result":true}"#))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    async fn issue(&self, request: Request) -> std::result::Result<Response, BoxError>;
}

/// Transport-level settings for [`ReqwestTransport`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Total time allowed for a request, including reading the body.
    pub timeout: Option<Duration>,

    /// Time allowed for establishing a connection.
    pub connect_timeout: Option<Duration>,

    /// Value of the `User-Agent` header.
    pub user_agent: Option<String>,
}

/// The default [`Transport`], backed by `reqwest`.
///
/// Each instance owns its own connection pool; clients never share one.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_config(&TransportConfig::default())
    }

    /// Creates a transport with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the settings are rejected by the
    /// HTTP client, e.g. an unusable user agent.
    pub fn with_config(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder
            .build()
            .map_err(|e| Error::invalid_input("failed to build HTTP client", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn issue(&self, request: Request) -> std::result::Result<Response, BoxError> {
        let Request {
            method,
            url,
            headers,
            body,
            context,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = context.run(builder.send()).await??;
        let status = response.status();
        let headers = response.headers().clone();

        // The context stays bound while the body is streamed.
        let chunks = Box::pin(response.bytes_stream());
        let body = stream::unfold((chunks, context), |(mut chunks, context)| async move {
            let next = context.run(chunks.next()).await;
            match next {
                Ok(Some(chunk)) => Some((chunk.map_err(BoxError::from), (chunks, context))),
                Ok(None) => None,
                Err(err) => Some((Err(BoxError::from(err)), (chunks, context))),
            }
        });

        Ok(Response::new(status, headers, ResponseBody::from_stream(body)))
    }
}
