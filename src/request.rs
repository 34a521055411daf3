//! Request values and the capability that builds them.

use crate::{context::Context, Error, Result};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::Method;
use url::Url;

/// A fully-built request, ready to hand to a [`Transport`](crate::Transport).
///
/// Built fresh for each call and consumed by the transport.
#[derive(Debug)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,

    /// The absolute request address.
    pub url: Url,

    /// Headers for this request.
    pub headers: HeaderMap,

    /// The serialized JSON body, if any.
    pub body: Option<Bytes>,

    /// The context the transport must honor while executing this request.
    pub context: Context,
}

/// Turns call arguments into a [`Request`].
///
/// Implementations must fail with [`Error::InvalidInput`] when the method or
/// address cannot form a valid request.
pub trait RequestBuilder: Send + Sync {
    fn build(
        &self,
        ctx: &Context,
        method: &str,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<Request>;
}

/// The default builder.
///
/// Parses the method and address, binds the context, and marks the request as
/// `application/json` when it carries a body. An empty method means `GET`.
///
/// # Examples
///
/// ```
/// use opaclient::{Context, JsonRequestBuilder, RequestBuilder};
///
/// let request = JsonRequestBuilder
///     .build(
///         &Context::background(),
///         "POST",
///         "http://localhost:8181/v1/data/authz",
///         Some(r#"{"input":{}}"#.into()),
///     )
///     .unwrap();
///
/// assert_eq!(request.method, http::Method::POST);
/// assert_eq!(request.headers["content-type"], "application/json");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRequestBuilder;

impl RequestBuilder for JsonRequestBuilder {
    fn build(
        &self,
        ctx: &Context,
        method: &str,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<Request> {
        let method = if method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(method.as_bytes())
                .map_err(|e| Error::invalid_input(format!("invalid method {:?}", method), e))?
        };

        let url = Url::parse(url)
            .map_err(|e| Error::invalid_input(format!("invalid address {:?}", url), e))?;

        let mut headers = HeaderMap::new();
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        Ok(Request {
            method,
            url,
            headers,
            body,
            context: ctx.clone(),
        })
    }
}
