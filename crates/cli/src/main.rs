use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    fieldmemo_cli::main_entry().await
}
