//! Command handlers wiring the CLI to the library.
use crate::batch::{run_batch as drive_batch, BatchOptions};
use crate::cli::{AdvanceArgs, BatchArgs, InitArgs, RepairArgs, ResetArgs, StatusArgs};
use crate::config::{default_config, load_config, write_config, EnrichConfig};
use crate::error::LlmError;
use crate::journal::Journal;
use crate::llm::{build_client, LlmClient, LlmRequest, LM_COMMAND_ENV};
use crate::orchestrator::EnrichmentOrchestrator;
use crate::record::RecordId;
use crate::repair::{RepairOptions, RepairStatus, StructuralRepairService};
use crate::retry::ThreadSleeper;
use crate::status::{build_status_summary, print_status};
use crate::store::{is_safe_record_id, FileRecordStore, RecordStore, WorkspacePaths};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const WORKSPACE_DIR_NAME: &str = "article-enrich";

/// Explicit `--workspace`, or the per-user data directory.
pub fn resolve_workspace(arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = arg {
        return Ok(path.to_path_buf());
    }
    dirs::data_dir()
        .map(|dir| dir.join(WORKSPACE_DIR_NAME))
        .ok_or_else(|| anyhow!("no data directory for this user; pass --workspace"))
}

/// Loaded workspace state shared by the record commands.
struct Workspace {
    paths: WorkspacePaths,
    config: EnrichConfig,
    store: Arc<FileRecordStore>,
}

impl Workspace {
    fn open(arg: Option<&Path>) -> Result<Self> {
        let root = resolve_workspace(arg)?;
        if !root.is_dir() {
            return Err(anyhow!(
                "workspace {} does not exist (run `aenrich init` first)",
                root.display()
            ));
        }
        let paths = WorkspacePaths::new(root);
        let config = load_config(&paths)?;
        let store = Arc::new(FileRecordStore::new(paths.clone()));
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    fn client(&self, lm: Option<&str>) -> Result<Arc<dyn LlmClient>> {
        let client = build_client(&self.config.llm, lm)?;
        tracing::debug!(client = %client.describe(), "llm client ready");
        Ok(Arc::from(client))
    }

    fn journal(&self, verbose: bool) -> Journal {
        Journal::new(self.paths.clone(), verbose)
    }

    fn orchestrator(&self, lm: Option<&str>, verbose: bool) -> Result<EnrichmentOrchestrator> {
        let store: Arc<dyn RecordStore> = self.store.clone();
        Ok(
            EnrichmentOrchestrator::new(&self.config, store, self.client(lm)?)
                .with_journal(self.journal(verbose)),
        )
    }

    fn display(&self) -> String {
        self.paths.root().display().to_string()
    }
}

fn record_id(raw: &str) -> Result<RecordId> {
    let id = RecordId::new(raw);
    if !is_safe_record_id(&id) {
        return Err(anyhow!("invalid record id {raw:?}"));
    }
    Ok(id)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

pub fn run_init(args: InitArgs) -> Result<()> {
    let root = resolve_workspace(args.workspace.as_deref())?;
    let paths = WorkspacePaths::new(root);
    let config_path = paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    fs::create_dir_all(paths.records_dir())
        .with_context(|| format!("create {}", paths.records_dir().display()))?;
    fs::create_dir_all(paths.logs_dir())
        .with_context(|| format!("create {}", paths.logs_dir().display()))?;
    write_config(&paths, &default_config())?;
    println!("wrote {}", config_path.display());
    if std::env::var_os(LM_COMMAND_ENV).is_none() {
        eprintln!(
            "note: the default backend reads its key from ${}; pass --lm or set {LM_COMMAND_ENV} to use a local command",
            default_config().llm.api_key_env
        );
    }
    Ok(())
}

pub fn run_advance(args: AdvanceArgs) -> Result<()> {
    let workspace = Workspace::open(args.workspace.as_deref())?;
    let id = record_id(&args.record)?;
    let orchestrator = workspace.orchestrator(args.lm.as_deref(), args.verbose)?;
    let outcomes = if args.to_completion {
        orchestrator.advance_to_completion(&id)?
    } else {
        vec![orchestrator.advance(&id)?]
    };
    if args.json {
        return print_json(&outcomes);
    }
    for outcome in &outcomes {
        println!(
            "{}: {} -> {} ({:?}, {} attempt(s))",
            outcome.record_id,
            outcome.phase,
            outcome.state,
            outcome.source,
            outcome.attempts
        );
        for warning in &outcome.warnings {
            println!("  warning: {warning}");
        }
    }
    if outcomes.is_empty() {
        println!("{id}: already completed");
    }
    Ok(())
}

pub fn run_batch(args: BatchArgs) -> Result<()> {
    let workspace = Workspace::open(args.workspace.as_deref())?;
    let mut options = BatchOptions::from_settings(&workspace.config.batch);
    options.limit = args.limit;
    options.to_completion = args.to_completion;
    if let Some(delay_ms) = args.delay_ms {
        options.delay = Duration::from_millis(delay_ms);
    }
    if let Some(jobs) = args.jobs {
        options.jobs = jobs.max(1);
    }
    let orchestrator = workspace.orchestrator(args.lm.as_deref(), args.verbose)?;
    let report = drive_batch(&orchestrator, &ThreadSleeper, &options)?;
    if args.json {
        return print_json(&report);
    }
    for item in &report.items {
        match &item.error {
            Some(error) => println!("{}: error: {error}", item.record_id),
            None => {
                let last = item.outcomes.last().map(|o| o.state.as_str()).unwrap_or("-");
                println!("{}: {last}", item.record_id);
            }
        }
    }
    println!(
        "processed {} record(s): {} ok, {} failed, {} fallback payload(s)",
        report.items.len(),
        report.succeeded(),
        report.failed(),
        report.fallbacks()
    );
    if report.failed() > 0 {
        return Err(anyhow!("{} record(s) failed", report.failed()));
    }
    Ok(())
}

pub fn run_repair(args: RepairArgs) -> Result<()> {
    let workspace = Workspace::open(args.workspace.as_deref())?;
    let id = record_id(&args.record)?;
    let reference = args.reference.as_deref().map(record_id).transpose()?;
    let store: Arc<dyn RecordStore> = workspace.store.clone();
    let service = StructuralRepairService::new(
        &workspace.config,
        store,
        workspace.client(args.lm.as_deref())?,
    )
    .with_journal(workspace.journal(args.verbose));
    let report = service.repair(
        &id,
        &RepairOptions {
            reference,
            dry_run: args.dry_run,
        },
    )?;
    if args.json {
        return print_json(&report);
    }
    match report.status {
        RepairStatus::NoFixNeeded => println!("{id}: no fix needed"),
        RepairStatus::DryRun => {
            println!("{id}: {} issue(s), nothing written", report.issues.len());
            for issue in &report.issues {
                println!("  - {issue}");
            }
        }
        RepairStatus::RepairedLocally | RepairStatus::Repaired => {
            println!(
                "{id}: repaired {} ({} LLM attempt(s))",
                report.repaired_fields.join(", "),
                report.attempts
            );
        }
    }
    Ok(())
}

pub fn run_reset(args: ResetArgs) -> Result<()> {
    let workspace = Workspace::open(args.workspace.as_deref())?;
    let id = record_id(&args.record)?;
    let store: Arc<dyn RecordStore> = workspace.store.clone();
    let orchestrator = EnrichmentOrchestrator::new(&workspace.config, store, Arc::new(NoClient))
        .with_journal(workspace.journal(false));
    let phase = orchestrator.reset_failed(&id, args.force)?;
    println!("{id}: reset to {phase}");
    Ok(())
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let workspace = Workspace::open(args.workspace.as_deref())?;
    let summary = build_status_summary(workspace.store.as_ref())?;
    if args.json {
        return print_json(&summary);
    }
    print_status(&workspace.display(), &summary);
    Ok(())
}

/// Reset never calls the model.
struct NoClient;

impl LlmClient for NoClient {
    fn complete(&self, _request: &LlmRequest) -> std::result::Result<String, LlmError> {
        Err(LlmError::Transport(
            "no LLM client configured for this command".to_string(),
        ))
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}
