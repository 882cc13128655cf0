//! CLI argument parsing for the enrichment workflow.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "aenrich",
    version,
    about = "LM-driven enrichment pipeline for vehicle articles",
    after_help = "Commands:\n  init --workspace <dir>                 Write a default config.json\n  advance --workspace <dir> --record <id>  Run the next enrichment phase\n  batch --workspace <dir>                Advance every eligible record\n  repair --workspace <dir> --record <id>   Fix misshaped base article fields\n  reset --workspace <dir> --record <id>    Return a failed record to its last good state\n  status --workspace <dir>               Summarize records per phase\n\nExamples:\n  aenrich init --workspace /tmp/articles\n  aenrich advance --workspace /tmp/articles --record onix-2024 --to-completion\n  aenrich batch --workspace /tmp/articles --limit 20 --jobs 2\n  aenrich repair --workspace /tmp/articles --record onix-2024 --dry-run\n  aenrich status --workspace /tmp/articles --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Advance(AdvanceArgs),
    Batch(BatchArgs),
    Repair(RepairArgs),
    Reset(ResetArgs),
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Initialize a workspace with a default config.json")]
pub struct InitArgs {
    /// Workspace root holding config.json, records/, and logs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Overwrite an existing config.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Run the next enrichment phase for one record")]
pub struct AdvanceArgs {
    /// Workspace root holding config.json, records/, and logs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Record id (file stem under records/)
    #[arg(long, value_name = "ID")]
    pub record: String,

    /// Keep advancing until the record is completed
    #[arg(long)]
    pub to_completion: bool,

    /// Shell command that reads a prompt on stdin and answers on stdout
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Store full prompts and responses under logs/lm_log/
    #[arg(long)]
    pub verbose: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Advance every eligible record")]
pub struct BatchArgs {
    /// Workspace root holding config.json, records/, and logs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Process at most this many records
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Pause between records (overrides batch.inter_record_delay_ms)
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Worker threads (overrides batch.jobs)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Run every phase for each record instead of one
    #[arg(long)]
    pub to_completion: bool,

    /// Shell command that reads a prompt on stdin and answers on stdout
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Store full prompts and responses under logs/lm_log/
    #[arg(long)]
    pub verbose: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Detect and fix misshaped fields in a completed record's base article")]
pub struct RepairArgs {
    /// Workspace root holding config.json, records/, and logs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Record id (file stem under records/)
    #[arg(long, value_name = "ID")]
    pub record: String,

    /// Known-good record of the same category to show the model
    #[arg(long, value_name = "ID")]
    pub reference: Option<String>,

    /// Report issues without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Shell command that reads a prompt on stdin and answers on stdout
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Store full prompts and responses under logs/lm_log/
    #[arg(long)]
    pub verbose: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Return a failed record to its last persisted state")]
pub struct ResetArgs {
    /// Workspace root holding config.json, records/, and logs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Record id (file stem under records/)
    #[arg(long, value_name = "ID")]
    pub record: String,

    /// Also reset a record stranded in a processing state
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize records per phase")]
pub struct StatusArgs {
    /// Workspace root holding config.json, records/, and logs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
