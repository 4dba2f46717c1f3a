use std::time::Duration;

use resilient_http::{ClientOption, ResilientClient};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Reply {
    errno: i64,
    errmsg: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // RESILIENT_HTTP_HOST=http://127.0.0.1:8080 cargo run --features tracing --example basic
    let client = ResilientClient::from_env()?;

    let reply: Reply = client
        .get("/rpc")
        .query([("name", "kit")])
        .options([
            ClientOption::retry_times(2),
            ClientOption::retry_timeout(Duration::from_secs(1)),
            ClientOption::retry_on_http_error(true),
        ])
        .send()
        .await?;

    println!("errno={} errmsg={}", reply.errno, reply.errmsg);
    Ok(())
}
