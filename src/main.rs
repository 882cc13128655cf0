use anyhow::Result;
use article_enrich::cli::{Command, RootArgs};
use article_enrich::workflow;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing();
    match args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::Advance(args) => workflow::run_advance(args),
        Command::Batch(args) => workflow::run_batch(args),
        Command::Repair(args) => workflow::run_repair(args),
        Command::Reset(args) => workflow::run_reset(args),
        Command::Status(args) => workflow::run_status(args),
    }
}

/// Log to stderr so stdout stays parseable with `--json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
