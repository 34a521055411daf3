//! # opaclient - a client for a remote policy-evaluation service
//!
//! `opaclient` sends requests to a policy service over HTTP and decodes its JSON
//! answers into caller-chosen types. Every call is a single attempt whose outcome
//! is reported in full: nothing is retried, cached, or batched.
//!
//! ## Quick Start
//!
//! ```no_run
//! use opaclient::{client::with_timeout, Client, Context};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct Input {
//!     user: String,
//!     action: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Query {
//!     input: Input,
//! }
//!
//! #[derive(Deserialize)]
//! struct Decision {
//!     result: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), opaclient::Error> {
//!     let client = Client::new(
//!         "http://localhost:8181/",
//!         [with_timeout(Duration::from_secs(10))],
//!     )?;
//!
//!     let query = Query {
//!         input: Input {
//!             user: "alice".to_string(),
//!             action: "read".to_string(),
//!         },
//!     };
//!
//!     let ctx = Context::with_timeout(Duration::from_secs(2));
//!     let decision: Decision = client.post(&ctx, "/v1/data/authz/allow", &query).await?;
//!     println!("Allowed: {}", decision.result);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Replaceable transport** - [`Transport`] is the only I/O seam; inject a fake for tests
//! - **Typed failures** - three error kinds with the status code and raw body attached
//! - **Cancellation** - a [`Context`] is bound to every request and honored by the transport
//! - **Strict success rule** - only `200 OK` is success; any other status is a failure
//! - **Structured logging** - events are emitted with `tracing`
//!
//! ## Error Handling
//!
//! ```no_run
//! use opaclient::{Client, Context, ErrorKind};
//!
//! # async fn example() -> Result<(), opaclient::Error> {
//! # let client = Client::new("http://localhost:8181", [])?;
//! match client.get::<serde_json::Value>(&Context::background(), "/v1/data").await {
//!     Ok(value) => println!("Data: {}", value),
//!     Err(e) => match e.kind() {
//!         ErrorKind::InvalidInput => eprintln!("Bad call: {}", e),
//!         ErrorKind::RequestFailed => {
//!             eprintln!("Service failed ({:?}): {:?}", e.status(), e.body())
//!         }
//!         ErrorKind::UnexpectedResponse => eprintln!("Unreadable answer: {:?}", e.body()),
//!     },
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
mod context;
mod error;
mod request;
mod response;
mod transport;

pub use client::{Client, ClientBuilder, ClientOption};
pub use context::{Context, ContextError};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use request::{JsonRequestBuilder, Request, RequestBuilder};
pub use response::{ReadError, Response, ResponseBody};
pub use transport::{ReqwestTransport, Transport, TransportConfig};
