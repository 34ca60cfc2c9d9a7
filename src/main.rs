//! stablerun CLI entry point.

use clap::Parser;

use stablerun::cli::Cli;

// One coordinating thread; parallelism comes from the child processes
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let code = stablerun::cli::commands::dispatch(cli).await;
    std::process::exit(code);
}
