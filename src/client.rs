//! Policy service client and the request executor.
//!
//! The [`Client`] type is the main entry point for making calls.
//! Construct it with [`Client::new`] and a list of options, or with
//! [`ClientBuilder`]; both apply options in order and stop at the first error.

use crate::{
    context::Context,
    error::BoxError,
    request::{JsonRequestBuilder, RequestBuilder},
    response::{ReadError, Response},
    transport::{ReqwestTransport, Transport, TransportConfig},
    Error, Result,
};
use bytes::Bytes;
use http::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A client for a remote policy-evaluation service.
///
/// The client is immutable once built and cheap to clone; clones share the
/// same transport. Each call is a single attempt: nothing is retried or cached.
///
/// # Examples
///
/// ```no_run
/// use opaclient::{client::with_timeout, Client, Context};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct Query<'a> {
///     input: &'a str,
/// }
///
/// #[derive(Deserialize)]
/// struct Decision {
///     result: bool,
/// }
///
/// # async fn example() -> Result<(), opaclient::Error> {
/// let client = Client::new(
///     "http://localhost:8181/",
///     [with_timeout(Duration::from_secs(5))],
/// )?;
///
/// let ctx = Context::with_timeout(Duration::from_secs(1));
/// let decision: Decision = client
///     .post(&ctx, "/v1/data/authz/allow", &Query { input: "alice" })
///     .await?;
/// println!("Allowed: {}", decision.result);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    transport: Arc<dyn Transport>,
    request_builder: Arc<dyn RequestBuilder>,
}

impl Client {
    /// Creates a client for `base_url`, applying `options` in order.
    ///
    /// Trailing `/` characters are trimmed from `base_url`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by an option, or
    /// [`Error::InvalidInput`] if `base_url` is empty after trimming.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaclient::Client;
    ///
    /// let client = Client::new("http://localhost:8181//", []).unwrap();
    /// assert_eq!(client.base_url(), "http://localhost:8181");
    /// ```
    pub fn new(
        base_url: impl Into<String>,
        options: impl IntoIterator<Item = Box<dyn ClientOption>>,
    ) -> Result<Self> {
        let mut config = ClientConfig::new(base_url.into());
        for option in options {
            option.apply(&mut config)?;
        }
        config.finish()
    }

    /// Creates a new `ClientBuilder` for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// The normalized base address, without trailing `/`.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Performs one call to `url` and decodes the JSON response into `T`.
    ///
    /// Only `200 OK` counts as success. The response body is always released
    /// before this returns.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidInput`] if the request cannot be built.
    /// * [`Error::RequestFailed`] if the transport fails, or if the status is not
    ///   `200 OK`; the status and the raw body are attached in the latter case.
    /// * [`Error::UnexpectedResponse`] if a `200 OK` body cannot be read or is not
    ///   valid JSON for `T`; the raw (possibly partial) body is attached.
    pub async fn execute<T>(
        &self,
        ctx: &Context,
        method: &str,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self.inner.request_builder.build(ctx, method, url, body)?;
        let method = request.method.clone();

        if let Some(err) = ctx.err() {
            tracing::warn!(
                error = %err,
                method = %method,
                url = url,
                "Context done before send"
            );
            return Err(Error::RequestFailed {
                message: "context is done".to_string(),
                status: None,
                body: None,
                source: Some(Box::new(err) as BoxError),
            });
        }

        tracing::debug!(method = %method, url = %request.url, "Executing HTTP request");

        let start_time = Instant::now();
        let response = self.inner.transport.issue(request).await.map_err(|source| {
            tracing::warn!(error = %source, method = %method, url = url, "Request failed");
            Error::RequestFailed {
                message: "failed to send request".to_string(),
                status: None,
                body: None,
                source: Some(source),
            }
        })?;

        // The body is owned here from now on and dropped on every path out.
        let Response { status, body, .. } = response;

        tracing::info!(
            status = status.as_u16(),
            latency_ms = start_time.elapsed().as_millis() as u64,
            "Received HTTP response"
        );

        if status != StatusCode::OK {
            let body = body.read_to_end().await.ok().map(lossy_text);

            if status.is_server_error() {
                tracing::warn!(status = status.as_u16(), response = ?body, "Server error (5xx)");
            } else {
                tracing::error!(
                    status = status.as_u16(),
                    response = ?body,
                    "Status code is not OK"
                );
            }

            return Err(Error::RequestFailed {
                message: "status code is not OK".to_string(),
                status: Some(status),
                body,
                source: None,
            });
        }

        let raw = body.read_to_end().await.map_err(|ReadError { partial, source }| {
            tracing::error!(
                error = %source,
                read_bytes = partial.len(),
                "Failed to read response body"
            );
            Error::UnexpectedResponse {
                message: "failed to read response body".to_string(),
                body: Some(lossy_text(partial)),
                source: Some(source),
            }
        })?;

        serde_json::from_slice(&raw).map_err(|e| {
            let raw_response = lossy_text(raw);
            tracing::error!(
                error = %e,
                raw_response = %raw_response,
                "Failed to deserialize response"
            );
            Error::UnexpectedResponse {
                message: "failed to decode response body".to_string(),
                body: Some(raw_response),
                source: Some(Box::new(e) as BoxError),
            }
        })
    }

    /// Performs one call to `<base_url><path>`.
    ///
    /// See [`Client::execute`] for the success and failure rules.
    pub async fn call<T>(
        &self,
        ctx: &Context,
        method: &str,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.inner.base_url, path);
        self.execute(ctx, method, &url, body).await
    }

    /// Makes a GET request to the specified path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use opaclient::{Client, Context};
    ///
    /// # async fn example() -> Result<(), opaclient::Error> {
    /// let client = Client::new("http://localhost:8181", [])?;
    /// let policies: serde_json::Value = client
    ///     .get(&Context::background(), "/v1/policies")
    ///     .await?;
    /// println!("{}", policies);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, ctx: &Context, path: &str) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        self.call(ctx, Method::GET.as_str(), path, None).await
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub async fn post<Req, Res>(&self, ctx: &Context, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = encode_json(body)?;
        self.call(ctx, Method::POST.as_str(), path, Some(body)).await
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub async fn put<Req, Res>(&self, ctx: &Context, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = encode_json(body)?;
        self.call(ctx, Method::PUT.as_str(), path, Some(body)).await
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub async fn patch<Req, Res>(&self, ctx: &Context, path: &str, body: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = encode_json(body)?;
        self.call(ctx, Method::PATCH.as_str(), path, Some(body)).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete<Res>(&self, ctx: &Context, path: &str) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        self.call(ctx, Method::DELETE.as_str(), path, None).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::invalid_input("failed to serialize request body", e))
}

fn lossy_text(raw: Vec<u8>) -> String {
    String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// A half-built client, as seen by [`ClientOption`]s.
///
/// Options may replace the transport or the request builder, or adjust the
/// settings of the default transport. Transport settings are ignored when a
/// custom transport is installed.
pub struct ClientConfig {
    base_url: String,
    transport: Option<Arc<dyn Transport>>,
    request_builder: Arc<dyn RequestBuilder>,
    transport_config: TransportConfig,
}

impl ClientConfig {
    fn new(base_url: String) -> Self {
        Self {
            base_url: normalize_base_url(&base_url).to_string(),
            transport: None,
            request_builder: Arc::new(JsonRequestBuilder),
            transport_config: TransportConfig::default(),
        }
    }

    /// The normalized base address.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Installs a custom transport in place of the default one.
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Installs a custom request builder.
    pub fn set_request_builder(&mut self, request_builder: Arc<dyn RequestBuilder>) {
        self.request_builder = request_builder;
    }

    /// Settings for the default `reqwest` transport.
    pub fn transport_config_mut(&mut self) -> &mut TransportConfig {
        &mut self.transport_config
    }

    fn finish(self) -> Result<Client> {
        if self.base_url.is_empty() {
            return Err(Error::invalid_config("base address is required"));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => {
                tracing::debug!(
                    base_url = %self.base_url,
                    "Using custom transport; transport settings are not applied"
                );
                transport
            }
            None => Arc::new(ReqwestTransport::with_config(&self.transport_config)?),
        };

        tracing::debug!(base_url = %self.base_url, "Policy client created");

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url: self.base_url,
                transport,
                request_builder: self.request_builder,
            }),
        })
    }
}

/// One step of client construction.
///
/// Any `FnOnce(&mut ClientConfig) -> Result<()>` closure is an option, so
/// callers can write their own validation.
///
/// # Examples
///
/// ```
/// use opaclient::{client::ClientConfig, Client, ClientOption, Error};
///
/// let require_https: Box<dyn ClientOption> = Box::new(|config: &mut ClientConfig| {
///     if config.base_url().starts_with("https://") {
///         Ok(())
///     } else {
///         Err(Error::InvalidInput {
///             message: "https is required".to_string(),
///             source: None,
///         })
///     }
/// });
///
/// assert!(Client::new("http://localhost:8181", [require_https]).is_err());
/// ```
pub trait ClientOption {
    fn apply(self: Box<Self>, config: &mut ClientConfig) -> Result<()>;
}

impl<F> ClientOption for F
where
    F: FnOnce(&mut ClientConfig) -> Result<()>,
{
    fn apply(self: Box<Self>, config: &mut ClientConfig) -> Result<()> {
        (*self)(config)
    }
}

/// Replaces the default transport, e.g. with a fake in tests.
pub fn with_transport(transport: impl Transport + 'static) -> Box<dyn ClientOption> {
    let transport: Arc<dyn Transport> = Arc::new(transport);
    Box::new(move |config: &mut ClientConfig| -> Result<()> {
        config.set_transport(transport);
        Ok(())
    })
}

/// Replaces the default [`JsonRequestBuilder`].
pub fn with_request_builder(
    request_builder: impl RequestBuilder + 'static,
) -> Box<dyn ClientOption> {
    let request_builder: Arc<dyn RequestBuilder> = Arc::new(request_builder);
    Box::new(move |config: &mut ClientConfig| -> Result<()> {
        config.set_request_builder(request_builder);
        Ok(())
    })
}

/// Sets the total request timeout of the default transport.
///
/// Fails construction if `timeout` is zero.
pub fn with_timeout(timeout: Duration) -> Box<dyn ClientOption> {
    Box::new(move |config: &mut ClientConfig| -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::invalid_config("timeout must be greater than zero"));
        }
        config.transport_config_mut().timeout = Some(timeout);
        Ok(())
    })
}

/// Sets the connect timeout of the default transport.
///
/// Fails construction if `timeout` is zero.
pub fn with_connect_timeout(timeout: Duration) -> Box<dyn ClientOption> {
    Box::new(move |config: &mut ClientConfig| -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::invalid_config("connect timeout must be greater than zero"));
        }
        config.transport_config_mut().connect_timeout = Some(timeout);
        Ok(())
    })
}

/// Sets the `User-Agent` header sent by the default transport.
pub fn with_user_agent(user_agent: impl Into<String>) -> Box<dyn ClientOption> {
    let user_agent = user_agent.into();
    Box::new(move |config: &mut ClientConfig| -> Result<()> {
        http::HeaderValue::try_from(user_agent.as_str())
            .map_err(|e| Error::invalid_input(format!("invalid user agent {:?}", user_agent), e))?;
        config.transport_config_mut().user_agent = Some(user_agent);
        Ok(())
    })
}

/// Builder for configuring and creating a [`Client`].
///
/// Options are recorded in call order and applied by [`ClientBuilder::build`],
/// which stops at the first failing option.
///
/// # Examples
///
/// ```no_run
/// use opaclient::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), opaclient::Error> {
/// let client = ClientBuilder::new("http://localhost:8181")
///     .timeout(Duration::from_secs(30))
///     .user_agent("my-app/1.0")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: String,
    options: Vec<Box<dyn ClientOption>>,
}

impl ClientBuilder {
    /// Creates a builder for `base_url` with no options.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            options: Vec::new(),
        }
    }

    /// Appends an arbitrary option.
    pub fn option(mut self, option: Box<dyn ClientOption>) -> Self {
        self.options.push(option);
        self
    }

    /// Replaces the default transport.
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.option(with_transport(transport))
    }

    /// Replaces the default request builder.
    pub fn request_builder(self, request_builder: impl RequestBuilder + 'static) -> Self {
        self.option(with_request_builder(request_builder))
    }

    /// Sets the request timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.option(with_timeout(timeout))
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(self, timeout: Duration) -> Self {
        self.option(with_connect_timeout(timeout))
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.option(with_user_agent(user_agent))
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by an option, in the order they were
    /// added, or [`Error::InvalidInput`] if the base address is empty.
    pub fn build(self) -> Result<Client> {
        Client::new(self.base_url, self.options)
    }
}
