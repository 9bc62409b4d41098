use clap::Parser;
use tracing_subscriber::EnvFilter;

use bamboozle::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Progress messages are shown by default; --verbose adds per-partition detail
    let filter = if cli.verbose {
        EnvFilter::new("bamboozle=debug,info")
    } else {
        EnvFilter::new("bamboozle=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    cli::run(&cli)
}
