use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use rulestage::{
    load_project, save_project, write_export, write_matrix, Completion, DatasetRef, ExportFormat,
    HttpComputeService, ParamValue, Project, ProjectSynchronizer, RawInput, ServiceConfig,
    SortOrder, StageController, StageEvent, StageKind, StageListing, Workbench,
};

#[derive(Parser)]
#[command(name = "rulestage")]
#[command(author, version, about = "Rough-set rule induction workbench client", long_about = None)]
struct Cli {
    /// Local project state file
    #[arg(short, long, global = true, default_value = "rulestage.json")]
    state: PathBuf,

    /// Compute server root (overrides RULESTAGE_SERVER)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a server-side project in a local state file
    Track {
        /// Project name
        #[arg(short, long)]
        name: String,

        /// Dataset the project was created from
        #[arg(short, long)]
        dataset: String,

        /// Server-side project id (a fresh one is generated if omitted)
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Show which stages are current, outdated or have unsaved changes
    Status,

    /// Load a stage and list its result
    Show {
        /// unions, rules or classification
        stage: StageKind,

        /// Only items containing this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Field to sort by
        #[arg(long)]
        sort: Option<String>,

        /// asc or desc
        #[arg(long, default_value = "asc")]
        order: SortOrder,
    },

    /// Edit stage parameters without computing
    Set {
        stage: StageKind,

        /// name=value pairs
        #[arg(required = true)]
        params: Vec<String>,
    },

    /// Recompute a stage, optionally with new parameters or input
    Compute {
        stage: StageKind,

        /// name=value pairs applied before computing
        params: Vec<String>,

        /// Upload new objects with the request
        #[arg(long, conflicts_with = "rules")]
        data: Option<PathBuf>,

        /// Upload an external rule set with the request
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Download a stage's result as a file
    Export {
        #[arg(default_value = "rules")]
        stage: StageKind,

        /// xml or txt
        #[arg(short, long, default_value = "xml")]
        format: ExportFormat,

        /// Output file or directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Download the classification's misclassification matrix
    Matrix {
        /// Output file or directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Track { name, dataset, id } => track(&cli.state, name, dataset, id),
        Commands::Status => status(&cli.state),
        Commands::Show {
            stage,
            filter,
            sort,
            order,
        } => show(&cli.state, cli.server, stage, filter, sort, order).await,
        Commands::Set { stage, params } => set(&cli.state, stage, &params),
        Commands::Compute {
            stage,
            params,
            data,
            rules,
        } => compute(&cli.state, cli.server, stage, &params, data, rules).await,
        Commands::Export {
            stage,
            format,
            output,
        } => export(&cli.state, cli.server, stage, format, &output).await,
        Commands::Matrix { output } => matrix(&cli.state, cli.server, &output).await,
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn connect(server: Option<String>) -> Result<HttpComputeService> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(server) = server {
        config = ServiceConfig::new(server).with_timeout(config.timeout);
    }
    info!("Using compute server {}", config.base_url);
    HttpComputeService::new(config)
}

fn parse_assignment(raw: &str) -> Result<(String, ParamValue)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected name=value, got: {}", raw))?;
    Ok((name.trim().to_string(), ParamValue::parse_input(value)))
}

fn read_input(path: &Path, part: &str) -> Result<RawInput> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| part.to_string());
    Ok(RawInput {
        part: part.to_string(),
        file_name,
        content,
    })
}

fn track(state: &Path, name: String, dataset: String, id: Option<Uuid>) -> Result<()> {
    if state.exists() {
        bail!("{:?} already tracks a project", state);
    }
    let project = Project::new(
        id.unwrap_or_else(Uuid::new_v4),
        name,
        DatasetRef { file_name: dataset },
    );
    save_project(&project, state)?;
    info!("Tracking project {} in {:?}", project.id, state);
    Ok(())
}

fn status(state: &Path) -> Result<()> {
    let project = load_project(state).context("Failed to load project state")?;

    println!("Project {} ({})", project.name, project.id);
    println!("Dataset: {}", project.dataset.file_name);
    if project.external_rules {
        println!("Rule set: uploaded");
    }
    if project.external_data {
        println!("Classified objects: uploaded");
    }
    println!();
    for (stage, _) in project.stages() {
        println!("{:<15} {}", stage, rulestage::io::status_line(&project, stage));
    }
    Ok(())
}

async fn show(
    state: &Path,
    server: Option<String>,
    stage: StageKind,
    filter: Option<String>,
    sort: Option<String>,
    order: SortOrder,
) -> Result<()> {
    let project = load_project(state).context("Failed to load project state")?;
    let mut workbench = Workbench::new(connect(server)?, project);

    workbench.open(stage).await;
    if let Some(query) = filter {
        workbench.filter(&query)?;
    }
    if let Some(field) = sort {
        workbench.sort(&field, order)?;
    }

    print_listing(&workbench, stage);
    save_project(&workbench.into_project(), state)
}

/// Edits are applied offline: the stage is activated and its fetch ticket dropped unsent.
fn set(state: &Path, stage: StageKind, params: &[String]) -> Result<()> {
    let project = load_project(state).context("Failed to load project state")?;
    let mut sync = ProjectSynchronizer::new(project);
    let mut controller = StageController::new(stage);

    let ticket = sync.switch_stage(None, &mut controller);
    controller.abort(&ticket);

    for raw in params {
        let (name, value) = parse_assignment(raw)?;
        controller.edit_parameter(&name, value)?;
    }
    sync.leave(&mut controller);

    info!("{} parameters saved locally; run `compute` to apply", stage);
    save_project(&sync.into_project(), state)
}

async fn compute(
    state: &Path,
    server: Option<String>,
    stage: StageKind,
    params: &[String],
    data: Option<PathBuf>,
    rules: Option<PathBuf>,
) -> Result<()> {
    let project = load_project(state).context("Failed to load project state")?;
    let input = match (data, rules) {
        (Some(path), _) => Some(read_input(&path, "data")?),
        (None, Some(path)) => Some(read_input(&path, "rules")?),
        (None, None) => None,
    };

    let mut workbench = Workbench::new(connect(server)?, project);
    workbench.open(stage).await;
    for raw in params {
        let (name, value) = parse_assignment(raw)?;
        workbench.edit(&name, value)?;
    }

    let completion = workbench.recompute(input).await?;
    print_listing(&workbench, stage);

    let outdated = workbench.outdated();
    if !outdated.is_empty() {
        let names: Vec<String> = outdated.iter().map(|s| s.to_string()).collect();
        warn!("Outdated stages: {}", names.join(", "));
    }
    save_project(&workbench.into_project(), state)?;

    if let Completion::Applied(StageEvent::Failed { error, .. }) = completion {
        bail!("{} failed: {}", stage, error);
    }
    Ok(())
}

async fn export(
    state: &Path,
    server: Option<String>,
    stage: StageKind,
    format: ExportFormat,
    output: &Path,
) -> Result<()> {
    let project = load_project(state).context("Failed to load project state")?;
    let workbench = Workbench::new(connect(server)?, project);

    let bytes = workbench
        .export(stage, format)
        .await
        .with_context(|| format!("Failed to export {}", stage))?;
    let path = write_export(output, workbench.project(), stage, format, &bytes)?;
    info!("Exported {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

async fn matrix(state: &Path, server: Option<String>, output: &Path) -> Result<()> {
    let project = load_project(state).context("Failed to load project state")?;
    let workbench = Workbench::new(connect(server)?, project);

    let bytes = workbench
        .download_matrix()
        .await
        .context("Failed to download misclassification matrix")?;
    let path = write_matrix(output, workbench.project(), &bytes)?;
    info!("Saved misclassification matrix to {:?}", path);
    Ok(())
}

fn print_listing(workbench: &Workbench<HttpComputeService>, stage: StageKind) {
    let listing = StageListing::new(workbench.controller(stage), workbench.project());
    print!("{}", listing.format());
}
