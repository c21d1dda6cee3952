// ABOUTME: Command-line front end for the flowchart analysis service
// ABOUTME: Submits C code, follows jobs with live status and writes rendered diagrams

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use flowchart_client::config::{ClientConfig, EngineKind};
use flowchart_client::logging::{init_logging, LoggingConfig};
use flowchart_client::poll::{self, JobListPoller, JobPoller, PollEvent};
use flowchart_client::remote::{Job, JobApi, JobSummary, RemoteClient, EMPTY_CODE_MESSAGE};
use flowchart_client::render::{self, DiagramBoard, DiagramRenderer, RenderOutput};

#[derive(Parser)]
#[command(name = "flowchart", version, about = "Generate flowcharts from C source via the analysis service")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service base URL (overrides config and FLOWCHART_API_BASE_URL)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Diagram engine used to render flowcharts
    #[arg(long, global = true, value_enum)]
    engine: Option<EngineKind>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit C source for analysis
    Submit {
        /// Source file; opens an editor when omitted
        file: Option<PathBuf>,
        /// Follow the job until it finishes
        #[arg(long)]
        watch: bool,
        /// Directory for rendered diagrams when watching
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// List jobs
    Jobs {
        /// Keep refreshing until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Follow a job and render its flowcharts
    Watch {
        job_id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Check that the service is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        verbose: cli.verbose,
        ..LoggingConfig::default()
    });

    let mut config = ClientConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(api_base) = cli.api_base {
        config.api_base_url = api_base;
    }
    if let Some(engine) = cli.engine {
        config.render_engine = engine;
    }
    config.validate().context("Invalid configuration")?;

    let client = Arc::new(
        RemoteClient::new(config.api_base_url.clone(), config.request_timeout())
            .context("Failed to create HTTP client")?,
    );
    tracing::debug!(api_base_url = %client.api_base_url(), engine = ?config.render_engine, "Client ready");

    match cli.command {
        Commands::Submit { file, watch, out } => {
            let code = read_code(file.as_deref()).await?;
            let job = client.create_job(&code).await.context("Failed to submit job")?;
            println!("{}", job.id);
            if watch {
                watch_job(client, &config, &job.id, &out).await?;
            }
        }
        Commands::Jobs { watch: false } => {
            let jobs = client.list_jobs().await.context("Failed to list jobs")?;
            print_jobs(&jobs);
        }
        Commands::Jobs { watch: true } => follow_jobs(client, &config).await?,
        Commands::Watch { job_id, out } => watch_job(client, &config, &job_id, &out).await?,
        Commands::Health => {
            let status = client.health().await.context("Health check failed")?;
            println!("{} is {}", client.api_base_url(), status);
        }
    }
    Ok(())
}

async fn read_code(file: Option<&Path>) -> Result<String> {
    let code = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => dialoguer::Editor::new()
            .extension(".c")
            .edit("")
            .context("Failed to open editor")?
            .unwrap_or_default(),
    };
    if code.trim().is_empty() {
        bail!(EMPTY_CODE_MESSAGE);
    }
    Ok(code)
}

fn status_line(job: &Job) -> String {
    let mut line = format!("{} {}", job.id, job.status.label());
    if let Some((processed, total)) = job.progress() {
        line.push_str(&format!(" • {} / {}", processed, total));
    }
    if job.status.is_active() {
        line.push_str(&format!(" - {}", job.status.message()));
    }
    line
}

async fn watch_job(
    api: Arc<dyn JobApi>,
    config: &ClientConfig,
    job_id: &str,
    out: &Path,
) -> Result<()> {
    let engine = render::engine_for(config.render_engine).context("Failed to set up diagram engine")?;
    let mut board = DiagramBoard::new(DiagramRenderer::new(engine));

    let (tx, mut rx) = poll::channel::<Job>();
    let poller = JobPoller::start(api, job_id, config.job_poll_settings(), Arc::new(tx));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    spinner.set_message(format!("{} loading…", job_id));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut tickets = Vec::new();
    let job = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                poller.stop();
                spinner.abandon_with_message("interrupted");
                return Ok(());
            }
            event = rx.recv() => match event {
                Some(PollEvent::Snapshot(job)) => {
                    spinner.set_message(status_line(&job));
                    tickets.extend(board.reconcile(&job));
                    if !job.status.is_active() {
                        break job;
                    }
                }
                Some(PollEvent::Error(message)) => spinner.println(format!("error: {}", message)),
                None => bail!("Job poller stopped unexpectedly"),
            }
        }
    };
    drop(poller);
    spinner.finish_with_message(status_line(&job));

    if let Some(message) = job.failure() {
        bail!("Job {} failed: {}", job.id, message);
    }

    for ticket in tickets {
        ticket.wait().await;
    }
    if board.is_empty() {
        println!("No flowchart generated.");
        return Ok(());
    }

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;
    for card in board.cards() {
        let badge = if card.validated { "validated" } else { "unvalidated" };
        let source = out.join(format!("{}.mmd", file_stem(&card.name)));
        tokio::fs::write(&source, &card.description)
            .await
            .with_context(|| format!("Failed to write {}", source.display()))?;
        match card.output {
            Some(RenderOutput::Diagram(artifact)) => {
                let path = out.join(format!("{}.svg", file_stem(&card.name)));
                tokio::fs::write(&path, artifact.svg)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("{} ({}): {}", card.name, badge, path.display());
            }
            Some(RenderOutput::Error { message, .. }) => {
                println!("{} ({}): render error: {}", card.name, badge, message);
            }
            None => println!("{} ({}): not rendered", card.name, badge),
        }
    }
    Ok(())
}

async fn follow_jobs(api: Arc<dyn JobApi>, config: &ClientConfig) -> Result<()> {
    let (tx, mut rx) = poll::channel::<Vec<JobSummary>>();
    let poller = JobListPoller::start(api, config.list_poll_interval(), Arc::new(tx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = rx.recv() => match event {
                Some(PollEvent::Snapshot(jobs)) => {
                    println!("--- {} ---", chrono::Local::now().format("%H:%M:%S"));
                    print_jobs(&jobs);
                }
                Some(PollEvent::Error(message)) => eprintln!("error: {}", message),
                None => break,
            }
        }
    }
    poller.stop();
    Ok(())
}

fn print_jobs(jobs: &[JobSummary]) {
    if jobs.is_empty() {
        println!("No jobs yet.");
        return;
    }
    for job in jobs {
        println!(
            "{:<38} {:<22} {}/{}",
            job.id,
            job.status.as_str(),
            job.processed_functions,
            job.total_functions
        );
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
