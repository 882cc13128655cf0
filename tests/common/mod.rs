//! Shared test infrastructure for integration tests.

#![allow(dead_code)]

use article_enrich::config::default_config;
use article_enrich::llm::{LlmClient, LlmRequest};
use article_enrich::record::VehicleIdentity;
use article_enrich::retry::Sleeper;
use article_enrich::store::{RecordStore, WorkspacePaths};
use article_enrich::{
    ContentRecord, EnrichmentOrchestrator, LlmError, Phase, RecordId, StructuralRepairService,
    VehicleCategory,
};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// LLM double that replays canned replies in order.
///
/// Once the script runs out every call is a transport error, which the
/// retry loop treats as retryable.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::default(),
        })
    }

    /// A client whose every call fails.
    pub fn failing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmClient for ScriptedLlmClient {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Records requested sleeps instead of blocking.
#[derive(Default)]
pub struct RecordingSleeper {
    naps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn naps(&self) -> Vec<Duration> {
        self.naps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.naps.lock().unwrap().push(duration);
    }
}

pub fn vehicle(make: &str, model: &str, year: u16, category: VehicleCategory) -> VehicleIdentity {
    VehicleIdentity {
        make: make.to_string(),
        model: model.to_string(),
        year,
        category,
    }
}

/// A representative vehicle for each category.
pub fn vehicle_for(category: VehicleCategory) -> VehicleIdentity {
    match category {
        VehicleCategory::Car => vehicle("Chevrolet", "Onix", 2024, category),
        VehicleCategory::CarElectric => vehicle("BYD", "Dolphin", 2024, category),
        VehicleCategory::CarHybrid => vehicle("Toyota", "Corolla Cross", 2023, category),
        VehicleCategory::Motorcycle => vehicle("Honda", "CG 160", 2023, category),
        VehicleCategory::MotorcycleScooter => vehicle("Honda", "PCX", 2024, category),
        VehicleCategory::MotorcycleStreet => vehicle("Yamaha", "MT-03", 2022, category),
        VehicleCategory::MotorcycleSport => vehicle("Kawasaki", "Ninja 400", 2023, category),
        VehicleCategory::MotorcycleTrail => vehicle("Honda", "XRE 300", 2022, category),
        VehicleCategory::Pickup => vehicle("Toyota", "Hilux", 2024, category),
        VehicleCategory::Truck => vehicle("Volkswagen", "Delivery 9.170", 2021, category),
    }
}

/// Base article with every renderer field already well-shaped.
pub fn well_shaped_article() -> Map<String, Value> {
    json!({
        "introducao": "Texto base do artigo.",
        "localizacao_etiqueta": {
            "local_principal": "coluna da porta do motorista",
            "descricao": "Etiqueta colada na coluna central.",
            "locais_alternativos": ["tampa do tanque"],
        },
        "especificacoes_por_versao": [],
        "tabela_carga": {"titulo": "Carga"},
        "perguntas_frequentes": [],
        "conversao_unidades": {"psi_para_bar": 0.0689},
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

pub fn record(id: &str, vehicle: VehicleIdentity, phase: Phase) -> ContentRecord {
    let mut base = Map::new();
    base.insert("introducao".to_string(), json!("Texto base do artigo."));
    let mut record = ContentRecord::new(RecordId::new(id), vehicle, base);
    record.phase = phase;
    record
}

pub fn onix(phase: Phase) -> ContentRecord {
    record("onix-2024", vehicle_for(VehicleCategory::Car), phase)
}

fn words(n: usize) -> String {
    vec!["conteúdo"; n].join(" ")
}

/// Editorial payload that passes the default strict bands.
pub fn editorial_json() -> Value {
    json!({
        "resumo_curto": "Guia de calibragem do Chevrolet Onix 2024 com orientações práticas para uso urbano, viagens com carga e verificação periódica dos pneus no posto de combustível.",
        "introducao": words(150),
        "consideracoes_finais": words(100),
        "perguntas_frequentes": (0..4)
            .map(|i| json!({"pergunta": format!("Pergunta {i}?"), "resposta": words(30)}))
            .collect::<Vec<_>>(),
    })
}

pub fn editorial_reply() -> String {
    format!("Aqui está o conteúdo:\n```json\n{}\n```", editorial_json())
}

/// Technical payload for the given trim names.
pub fn technical_json(variants: &[&str]) -> Value {
    let specs: Vec<Value> = variants
        .iter()
        .map(|name| {
            json!({
                "versao": name,
                "medida_pneus": "185/65 R15",
                "pressao_dianteiro_normal": 32,
                "pressao_traseiro_normal": 32,
                "pressao_dianteiro_carregado": 35,
                "pressao_traseiro_carregado": 38,
            })
        })
        .collect();
    json!({
        "especificacoes_por_versao": specs,
        "tabela_carga": {
            "titulo": "Pressão conforme a carga",
            "condicoes": [
                {"versao": variants[0], "situacao": "Carga máxima", "pressao_dianteira": 35, "pressao_traseira": 38}
            ]
        }
    })
}

pub fn technical_reply() -> String {
    technical_json(&["Onix LT 1.0", "Onix LTZ 1.0 Turbo", "Onix Premier 1.0 Turbo"]).to_string()
}

pub fn orchestrator(
    store: Arc<dyn RecordStore>,
    client: Arc<ScriptedLlmClient>,
) -> EnrichmentOrchestrator {
    EnrichmentOrchestrator::new(&default_config(), store, client)
        .with_sleeper(Arc::new(RecordingSleeper::default()))
}

pub fn repair_service(
    store: Arc<dyn RecordStore>,
    client: Arc<ScriptedLlmClient>,
) -> StructuralRepairService {
    StructuralRepairService::new(&default_config(), store, client)
        .with_sleeper(Arc::new(RecordingSleeper::default()))
}

/// A throwaway workspace driven through the `aenrich` binary.
pub struct CliWorkspace {
    dir: TempDir,
    pub root: PathBuf,
}

impl CliWorkspace {
    /// Run `aenrich init` in a fresh temp directory.
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("ws");
        let workspace = Self { dir, root };
        let output = workspace.run(&["init"]);
        assert!(output.status.success(), "init failed: {}", stderr(&output));
        workspace
    }

    pub fn paths(&self) -> WorkspacePaths {
        WorkspacePaths::new(self.root.clone())
    }

    pub fn write_record(&self, record: &ContentRecord) {
        let path = self.paths().record_path(&record.id);
        let text = serde_json::to_string_pretty(record).expect("serialize record");
        std::fs::write(&path, text).expect("write record");
    }

    pub fn read_record(&self, id: &str) -> ContentRecord {
        let path = self.paths().record_path(&RecordId::new(id));
        let text = std::fs::read_to_string(&path).expect("read record");
        serde_json::from_str(&text).expect("parse record")
    }

    /// Run a subcommand with `--workspace` appended.
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_aenrich"))
            .args(args)
            .arg("--workspace")
            .arg(&self.root)
            .env("RUST_LOG", "warn")
            .output()
            .expect("spawn aenrich")
    }

    /// Write `reply` to a file and return an LM command that prints it.
    ///
    /// The command drains stdin first so the prompt write never hits a
    /// closed pipe.
    pub fn reply_command(&self, name: &str, replies: &[(&str, &str)], default: &str) -> String {
        let dir = self.dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("create reply dir");
        let default_path = write_reply(&dir, "default.txt", default);
        let mut script = String::from("p=$(cat); case \"$p\" in ");
        for (idx, (marker, reply)) in replies.iter().enumerate() {
            let path = write_reply(&dir, &format!("reply{idx}.txt"), reply);
            script.push_str(&format!("*{marker}*) cat '{}' ;; ", path.display()));
        }
        script.push_str(&format!("*) cat '{}' ;; esac", default_path.display()));
        shell_words::join(["sh", "-c", script.as_str()])
    }
}

fn write_reply(dir: &Path, name: &str, reply: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, reply).expect("write reply");
    path
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
