//! Basic example asking a local policy server for a decision.
//!
//! This example shows how to:
//! - Create a client with a timeout option
//! - Query a document with GET
//! - Evaluate a rule with POST and an `input` document
//!
//! Start a policy server on `localhost:8181` first, then
//! run with: `cargo run --example basic_call`

use opaclient::{client::with_timeout, Client, Context, Error};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct Input {
    user: String,
    action: String,
    resource: String,
}

#[derive(Debug, Serialize)]
struct Query {
    input: Input,
}

#[derive(Debug, Deserialize)]
struct Decision {
    #[serde(default)]
    result: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("opaclient=debug,basic_call=info")
        .init();

    let client = Client::new(
        "http://localhost:8181/",
        [with_timeout(Duration::from_secs(10))],
    )?;
    println!("Base address: {}", client.base_url());

    println!("=== GET Request Example ===");
    let ctx = Context::with_timeout(Duration::from_secs(2));
    let data: serde_json::Value = client.get(&ctx, "/v1/data").await?;
    println!("Data document: {}", data);
    println!();

    println!("=== POST Request Example ===");
    let query = Query {
        input: Input {
            user: "alice".to_string(),
            action: "read".to_string(),
            resource: "reports".to_string(),
        },
    };

    let decision: Decision = client.post(&ctx, "/v1/data/authz/allow", &query).await?;
    match decision.result {
        Some(allowed) => println!("Allowed: {}", allowed),
        None => println!("Rule is undefined for this input"),
    }

    Ok(())
}
