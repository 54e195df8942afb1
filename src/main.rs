use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    autopom::cli::app::run().await
}
