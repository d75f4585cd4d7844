//! vslice - migrate a legacy source tree slice by slice

mod logging;
mod source;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use vslice_core::{
    AnalysisStage, NoopHook, PipelineConfig, PipelineDeps, PipelineOrchestrator, ProcessResult,
};
use vslice_events::{ConfidenceAggregator, MemoryEventSink};
use vslice_model::{Project, ProjectId, ProjectStatus};
use vslice_store::{CheckpointStore, FileCheckpointStore, FileProjectStore, ProjectStore};

use crate::source::{DirectoryPlanner, InventoryStage, ManifestStage};

fn state_dir_arg() -> Arg {
    Arg::new("state-dir")
        .long("state-dir")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Directory holding project, slice and checkpoint files")
}

fn id_arg() -> Arg {
    Arg::new("id")
        .long("id")
        .value_parser(value_parser!(ProjectId))
        .help("Existing project id")
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("Pipeline configuration (TOML)")
}

fn cli() -> Command {
    Command::new("vslice")
        .version(vslice_core::VERSION)
        .about("Checkpointed migration pipeline with self-healing slice builds")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Analyze, plan and build a project; events stream to stdout as JSON lines")
                .arg(
                    Arg::new("project")
                        .long("project")
                        .conflicts_with("id")
                        .required_unless_present("id")
                        .help("Name of a new project"),
                )
                .arg(id_arg())
                .arg(state_dir_arg())
                .arg(config_arg())
                .arg(
                    Arg::new("source")
                        .long("source")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Legacy source tree to analyze"),
                )
                .arg(
                    Arg::new("wait-for-config")
                        .long("wait-for-config")
                        .action(ArgAction::SetTrue)
                        .help("Stop after analysis instead of configuring the project"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Print a stored project, its slices and checkpoint as JSON")
                .arg(id_arg().required(true))
                .arg(state_dir_arg()),
        )
        .subcommand(
            Command::new("pause")
                .about("Pause a project at its next slice boundary")
                .arg(id_arg().required(true))
                .arg(state_dir_arg())
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("resume")
                .about("Resume a paused project")
                .arg(id_arg().required(true))
                .arg(state_dir_arg())
                .arg(config_arg()),
        )
}

fn load_config(args: &ArgMatches) -> Result<PipelineConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(PipelineConfig::new()),
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(
    args: &'a ArgMatches,
    name: &str,
) -> Result<&'a T> {
    args.get_one::<T>(name)
        .with_context(|| format!("missing --{name}"))
}

/// Orchestrator over file-backed stores, plus the sink it reports to
fn wire(
    config: PipelineConfig,
    state_dir: &Path,
    source: &Path,
) -> Result<(PipelineOrchestrator, Arc<FileProjectStore>, Arc<MemoryEventSink>)> {
    let confidence = Arc::new(ConfidenceAggregator::new(config.completion_threshold));
    let sink = Arc::new(MemoryEventSink::new(confidence.clone()));
    let projects = Arc::new(FileProjectStore::new(state_dir));
    let stages: Vec<Arc<dyn AnalysisStage>> = vec![
        Arc::new(InventoryStage::new(source)),
        Arc::new(ManifestStage::new(source)),
    ];

    let orchestrator = PipelineOrchestrator::new(
        config,
        PipelineDeps {
            projects: projects.clone(),
            checkpoints: Arc::new(FileCheckpointStore::new(state_dir)),
            sink: sink.clone(),
            confidence,
            stages,
            planner: Arc::new(DirectoryPlanner),
            codegen: None,
            sandbox: None,
            hook: Arc::new(NoopHook),
        },
    )
    .context("failed to wire the pipeline")?;
    Ok((orchestrator, projects, sink))
}

/// Print every event as a JSON line until the sink goes away
fn stream_events(sink: &MemoryEventSink) -> JoinHandle<()> {
    let mut events = sink.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::warn!(error = %err, "event not printable"),
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn report(result: &ProcessResult, id: ProjectId) {
    tracing::info!(
        project = %id,
        status = %result.status.as_str(),
        success = result.success,
        "{}",
        result.message
    );
    eprintln!("{id}: {} ({})", result.status.as_str(), result.message);
}

async fn run(args: &ArgMatches) -> Result<bool> {
    let config = load_config(args)?;
    logging::init(&config.logging)?;
    let state_dir = required::<PathBuf>(args, "state-dir")?;
    let source = required::<PathBuf>(args, "source")?;
    let wait_for_config = args.get_flag("wait-for-config");

    let (orchestrator, projects, sink) = wire(config, state_dir, source)?;
    let printer = stream_events(&sink);

    let id = if let Some(id) = args.get_one::<ProjectId>("id") {
        projects
            .get(*id)
            .await
            .with_context(|| format!("project {id} not found in {}", state_dir.display()))?
            .id
    } else {
        let name = required::<String>(args, "project")?;
        let project = Project::new(name.as_str());
        let id = project.id;
        projects
            .create(project)
            .await
            .context("failed to create project")?;
        tracing::info!(project = %id, name = %name, "project created");
        id
    };

    let mut result = orchestrator.process(id).await?;
    if result.status == ProjectStatus::Analyzed && !wait_for_config {
        orchestrator.mark_configured(id).await?;
        result = orchestrator.process(id).await?;
    }
    report(&result, id);

    drop(orchestrator);
    drop(sink);
    printer.await.context("event printer crashed")?;
    Ok(result.success)
}

async fn status(args: &ArgMatches) -> Result<bool> {
    logging::init(&PipelineConfig::new().logging)?;
    let state_dir = required::<PathBuf>(args, "state-dir")?;
    let id = *required::<ProjectId>(args, "id")?;

    let projects = FileProjectStore::new(state_dir);
    let project = projects
        .get(id)
        .await
        .with_context(|| format!("project {id} not found in {}", state_dir.display()))?;
    let slices = projects.slices(id).await?;
    let checkpoint = FileCheckpointStore::new(state_dir).load(id).await?;

    let summary = serde_json::json!({
        "project": project,
        "slices": slices,
        "completed_steps": checkpoint.completed_steps().collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(true)
}

async fn control(args: &ArgMatches, pause: bool) -> Result<bool> {
    let config = load_config(args)?;
    logging::init(&config.logging)?;
    let state_dir = required::<PathBuf>(args, "state-dir")?;
    let id = *required::<ProjectId>(args, "id")?;

    let (orchestrator, _, _) = wire(config, state_dir, Path::new("."))?;
    let project = if pause {
        orchestrator.pause(id).await?
    } else {
        orchestrator.resume(id).await?
    };
    eprintln!("{id}: {}", project.status.as_str());
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let success = match matches.subcommand() {
        Some(("run", args)) => run(args).await?,
        Some(("status", args)) => status(args).await?,
        Some(("pause", args)) => control(args, true).await?,
        Some(("resume", args)) => control(args, false).await?,
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
