//! Example demonstrating how to branch on the error kinds.
//!
//! This example shows how to:
//! - Handle a non-200 status with its attached status code and body
//! - Handle a response that does not match the expected shape
//! - Detect a call cut short by its context
//! - Handle a malformed request
//!
//! Run with: `cargo run --example error_handling`

use opaclient::{Client, Context, Error, ErrorKind};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Decision {
    result: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("opaclient=info")
        .init();

    let client = Client::builder("http://localhost:8181")
        .connect_timeout(Duration::from_secs(2))
        .build()?;
    let ctx = Context::background();

    println!("=== Example 1: Handling Non-200 Status ===");
    match client.get::<Decision>(&ctx, "/v1/policies/does-not-exist").await {
        Ok(decision) => println!("Success: {:?}", decision),
        Err(Error::RequestFailed {
            status: Some(status),
            body,
            ..
        }) => {
            println!("Request failed!");
            println!("  Status code: {}", status.as_u16());
            println!("  Is client error (4xx): {}", status.is_client_error());
            println!("  Raw response: {}", body.as_deref().unwrap_or("<unavailable>"));
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 2: Handling Unexpected Responses ===");
    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct WrongSchema {
        nonexistent_field: String,
    }

    match client.get::<WrongSchema>(&ctx, "/v1/data").await {
        Ok(data) => println!("Success: {:?}", data),
        Err(Error::UnexpectedResponse { body, source, .. }) => {
            println!("Unexpected response!");
            println!("  Raw response: {}", body.unwrap_or_default());
            if let Some(source) = source {
                println!("  Cause: {}", source);
            }
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 3: Canceled Context ===");
    let short = Context::with_timeout(Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(5)).await;
    match client.get::<Decision>(&short, "/v1/data/authz/allow").await {
        Ok(decision) => println!("Success: {:?}", decision),
        Err(e) if e.is_canceled() => println!("Canceled: {} (kind: {})", e, e.kind()),
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 4: Invalid Input ===");
    let err = client
        .call::<Decision>(&ctx, "NOT A METHOD", "/v1/data", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    println!("Rejected before sending: {}", err);

    Ok(())
}
