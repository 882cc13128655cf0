//! Drives the `aenrich` binary against a temp workspace.

mod common;

use article_enrich::{EnrichmentPhase, Phase};
use common::{editorial_reply, onix, stderr, stdout, technical_reply, CliWorkspace};
use serde_json::{json, Value};

#[test]
fn init_refuses_to_overwrite_without_force() {
    let workspace = CliWorkspace::init();
    assert!(workspace.paths().config_path().is_file());
    assert!(workspace.paths().records_dir().is_dir());

    let again = workspace.run(&["init"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("--force"));

    let forced = workspace.run(&["init", "--force"]);
    assert!(forced.status.success(), "{}", stderr(&forced));
}

#[test]
fn advance_to_completion_through_a_command_backend() {
    let workspace = CliWorkspace::init();
    workspace.write_record(&onix(Phase::BaseGenerated));
    let technical = technical_reply();
    let lm = workspace.reply_command(
        "lm",
        &[("especificacoes_por_versao", technical.as_str())],
        &editorial_reply(),
    );

    let output = workspace.run(&[
        "advance",
        "--record",
        "onix-2024",
        "--to-completion",
        "--json",
        "--lm",
        lm.as_str(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let outcomes: Value = serde_json::from_str(&stdout(&output)).expect("json output");
    let outcomes = outcomes.as_array().expect("array");
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[1]["state"], json!("completed"));
    assert_eq!(outcomes[1]["source"], json!("llm"));

    let stored = workspace.read_record("onix-2024");
    assert_eq!(stored.phase, Phase::Completed);
    assert!(stored.phase_outputs.editorial.is_some());
    assert!(stored.phase_outputs.technical.is_some());
    assert!(workspace.paths().history_path().is_file());
    assert!(workspace.paths().lm_log_path().is_file());
}

#[test]
fn status_json_lists_failed_records() {
    let workspace = CliWorkspace::init();
    workspace.write_record(&onix(Phase::BaseGenerated));
    let mut failed = common::record(
        "hilux-2024",
        common::vehicle_for(article_enrich::VehicleCategory::Pickup),
        Phase::Failed,
    );
    failed.last_error = Some("invalid credentials".to_string());
    failed.failed_phase = Some(EnrichmentPhase::Editorial);
    workspace.write_record(&failed);

    let output = workspace.run(&["status", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let summary: Value = serde_json::from_str(&stdout(&output)).expect("json output");
    assert_eq!(summary["total"], json!(2));
    assert_eq!(summary["eligible"], json!(1));
    assert_eq!(summary["failed"][0]["record_id"], json!("hilux-2024"));
    assert_eq!(summary["failed"][0]["failed_phase"], json!("editorial"));

    let text = workspace.run(&["status"]);
    assert!(stdout(&text).contains("next: aenrich batch"));
}

#[test]
fn reset_returns_a_failed_record_to_base_generated() {
    let workspace = CliWorkspace::init();
    let mut failed = onix(Phase::Failed);
    failed.last_error = Some("boom".to_string());
    workspace.write_record(&failed);

    let output = workspace.run(&["reset", "--record", "onix-2024"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("reset to base-generated"));
    let stored = workspace.read_record("onix-2024");
    assert_eq!(stored.phase, Phase::BaseGenerated);
    assert!(stored.last_error.is_none());
}

#[test]
fn repair_dry_run_leaves_the_file_untouched() {
    let workspace = CliWorkspace::init();
    let mut record = onix(Phase::Completed);
    record.base_article.insert(
        "localizacao_etiqueta".to_string(),
        json!("Na coluna da porta do motorista"),
    );
    workspace.write_record(&record);
    let path = workspace.paths().record_path(&record.id);
    let before = std::fs::read_to_string(&path).expect("read");

    let output = workspace.run(&[
        "repair",
        "--record",
        "onix-2024",
        "--dry-run",
        "--json",
        "--lm",
        "false",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let report: Value = serde_json::from_str(&stdout(&output)).expect("json output");
    assert_eq!(report["status"], json!("dry_run"));
    assert_eq!(report["issues"][0]["field"], json!("localizacao_etiqueta"));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
}

#[test]
fn unsafe_record_ids_are_rejected() {
    let workspace = CliWorkspace::init();
    let output = workspace.run(&["advance", "--record", "../escape", "--lm", "false"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid record id"));
}
