mod clipboard;
mod prompt;

use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    config::{parse_base_url, CONFIG_FILE},
    load_client_config_from, tabs, AcceptAll, ClientConfig, ConfirmationPrompt, DocumentGateway,
    HttpGateway, Workflow, Workspace, WorkspaceSnapshot,
};
use shared::domain::TAB_LABELS;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{clipboard::ArboardClipboard, prompt::TerminalConfirmation};

#[derive(Parser, Debug)]
#[command(name = "medidocs", about = "Draft and evaluate clinical documents")]
struct Cli {
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// Overrides the backend location from the config file and environment.
    #[arg(long)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists departments, document types and models known to the backend.
    Catalog,
    Doctors {
        department: String,
    },
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Medical record text; `-` reads stdin.
    input: PathBuf,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    doctor: Option<String>,
    #[arg(long)]
    document_type: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    referral_purpose: Option<String>,
    #[arg(long)]
    prescription: Option<String>,
    #[arg(long)]
    additional_info: Option<String>,
    /// Evaluates the generated document afterwards.
    #[arg(long)]
    evaluate: bool,
    /// Answers yes to every confirmation.
    #[arg(long)]
    yes: bool,
    /// Tab label to copy to the clipboard, e.g. 全文 or 主病名.
    #[arg(long)]
    copy_tab: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = load_client_config_from(&cli.config, |key| std::env::var(key).ok())?;
    if let Some(raw) = &cli.base_url {
        config.base_url = parse_base_url(raw)?;
    }
    info!(base_url = %config.base_url, "medidocs: using backend");

    match cli.command {
        Command::Catalog => print_catalog(&config).await,
        Command::Doctors { department } => {
            let gateway = HttpGateway::new(config.gateway());
            for doctor in gateway.doctors(&department).await? {
                println!("{doctor}");
            }
            Ok(())
        }
        Command::Generate(args) => generate(config, args).await,
    }
}

async fn print_catalog(config: &ClientConfig) -> Result<()> {
    let gateway = HttpGateway::new(config.gateway());
    let (departments, document_types, models) = tokio::try_join!(
        gateway.departments(),
        gateway.document_types(),
        gateway.available_models(),
    )?;

    println!("診療科:");
    for department in departments {
        println!("  {department}");
    }
    println!("文書種別:");
    for document_type in document_types {
        println!("  {document_type}");
    }
    println!("モデル:");
    for model in models.available_models {
        let marker = if models.default_model.as_deref() == Some(model.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  {model}{marker}");
    }
    Ok(())
}

async fn generate(config: ClientConfig, args: GenerateArgs) -> Result<()> {
    let medical_text = read_input(&args.input)?;
    if let Some(label) = &args.copy_tab {
        if tabs::index_of(label).is_none() {
            bail!(
                "unknown tab '{label}', expected one of: {}",
                TAB_LABELS.join(", ")
            );
        }
    }

    let confirmation: Arc<dyn ConfirmationPrompt> = if args.yes {
        Arc::new(AcceptAll)
    } else {
        Arc::new(TerminalConfirmation)
    };
    let workspace = Workspace::new_with_dependencies(
        Arc::new(HttpGateway::new(config.gateway())),
        confirmation,
        Arc::new(ArboardClipboard),
        config.workspace(),
    );

    workspace.init().await;
    if let Some(department) = &args.department {
        workspace
            .select_department(department)
            .await
            .await
            .context("doctor list refresh task failed")?;
    }
    if let Some(doctor) = &args.doctor {
        workspace.select_doctor(doctor).await?;
    }
    if let Some(document_type) = &args.document_type {
        workspace.select_document_type(document_type).await;
    }
    if let Some(model) = &args.model {
        workspace.select_model(model).await;
    }
    workspace
        .edit_form(|form| {
            form.medical_text = medical_text;
            if let Some(purpose) = args.referral_purpose.clone() {
                form.referral_purpose = purpose;
            }
            if let Some(prescription) = args.prescription.clone() {
                form.current_prescription = prescription;
            }
            if let Some(info) = args.additional_info.clone() {
                form.additional_info = info;
            }
        })
        .await;

    run_with_progress(&workspace, Workflow::Generation).await?;
    if let Some(notice) = workspace.model_switch_notice().await {
        eprintln!("{notice}");
    }
    print_document(&workspace.snapshot().await);

    if args.evaluate {
        run_with_progress(&workspace, Workflow::Evaluation).await?;
        let snapshot = workspace.snapshot().await;
        println!("【評価】");
        println!("{}", snapshot.evaluation.result_text);
    }

    if let Some(label) = &args.copy_tab {
        let index = tabs::index_of(label).ok_or_else(|| anyhow!("unknown tab '{label}'"))?;
        workspace.select_tab(index).await?;
        workspace.copy_current_tab().await?;
        eprintln!("{label} をコピーしました");
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read medical text from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read medical text from '{}'", path.display()))
}

async fn run_with_progress(workspace: &Arc<Workspace>, workflow: Workflow) -> Result<()> {
    let reporter = spawn_progress_reporter(Arc::clone(workspace), workflow);
    let outcome = match workflow {
        Workflow::Generation => workspace.generate_summary().await,
        Workflow::Evaluation => workspace.evaluate_output().await,
    };
    reporter.abort();
    eprintln!();
    outcome.map_err(Into::into)
}

fn spawn_progress_reporter(workspace: Arc<Workspace>, workflow: Workflow) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticks.tick().await;
            let snapshot = workspace.snapshot().await;
            let (running, elapsed) = match workflow {
                Workflow::Generation => {
                    (snapshot.is_generating, snapshot.generation_elapsed_secs)
                }
                Workflow::Evaluation => {
                    (snapshot.is_evaluating, snapshot.evaluation_elapsed_secs)
                }
            };
            if running {
                let label = match workflow {
                    Workflow::Generation => "作成中",
                    Workflow::Evaluation => "評価中",
                };
                eprint!("\r{label}... {elapsed}秒");
            }
        }
    })
}

fn print_document(snapshot: &WorkspaceSnapshot) {
    for (index, label) in TAB_LABELS.iter().enumerate() {
        let content = tabs::resolve(index, &snapshot.result);
        if content.is_empty() {
            continue;
        }
        println!("【{label}】");
        println!("{content}");
        println!();
    }
}
