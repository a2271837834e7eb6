use anyhow::Context;
use clap::Parser;
use conductor::cli::{self, Args};
use conductor::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = logging::init(&args.command).context("failed to initialize logging")?;
    cli::run(args).await
}
