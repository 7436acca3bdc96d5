use anyhow::Result;
use tempmail::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
