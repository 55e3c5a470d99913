//! spindle - run word-frequency tasks through the lifecycle engine.
//!
//! Submits each text as a task, runs the worker pool and orphan scanner
//! until every task is terminal, then prints the task views as JSON.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use spindle_core::observability::{LogFormat, init_tracing};
use spindle_core::{EngineBuilder, EngineConfig, TaskId, TaskOptions, TaskPayload, TaskView};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; SPINDLE_* environment variables override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse texts (arguments, files, or stdin when neither is given)
    Run(RunArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Texts to analyse, one task each
    texts: Vec<String>,

    /// Read a text from a file (repeatable)
    #[arg(short, long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Override the configured worker count
    #[arg(short, long)]
    workers: Option<usize>,

    /// Number of most frequent words to report
    #[arg(long, default_value_t = 10)]
    top_n: usize,

    #[arg(long)]
    case_sensitive: bool,

    /// Count stop words too
    #[arg(long)]
    keep_stop_words: bool,

    #[arg(long, default_value_t = 1)]
    min_word_length: usize,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,
}

impl RunArgs {
    fn options(&self) -> TaskOptions {
        TaskOptions {
            top_n: self.top_n,
            case_sensitive: self.case_sensitive,
            exclude_stop_words: !self.keep_stop_words,
            min_word_length: self.min_word_length,
        }
    }

    fn collect_texts(&self) -> anyhow::Result<Vec<String>> {
        let mut texts = self.texts.clone();
        for path in &self.files {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            texts.push(text);
        }
        if texts.is_empty() {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            texts.push(text);
        }
        Ok(texts)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format, "info");

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run(args) => {
            if let Some(workers) = args.workers {
                config.workers = workers;
            }
            run(config, args).await
        }
    }
}

async fn run(config: EngineConfig, args: RunArgs) -> anyhow::Result<()> {
    let engine = EngineBuilder::new(config).build()?;
    let service = engine.service();

    let mut ids: Vec<TaskId> = Vec::new();
    for text in args.collect_texts()? {
        let id = service
            .submit(TaskPayload::new(text), args.options())
            .await
            .context("submitting task")?;
        ids.push(id);
    }
    info!(tasks = ids.len(), "submitted");

    let handle = engine.start();
    let settled = wait_until_terminal(&service, &ids);
    let outcome = tokio::select! {
        res = tokio::time::timeout(Duration::from_secs(args.timeout_secs), settled) => match res {
            Ok(res) => res,
            Err(_) => Err(anyhow::anyhow!("tasks still running after {}s", args.timeout_secs)),
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting down");
            Err(anyhow::anyhow!("interrupted"))
        }
    };
    handle.shutdown_and_join().await;

    let views = outcome?;
    println!("{}", serde_json::to_string_pretty(&views)?);

    let stats = service.stats().await?;
    info!(
        completed = stats.tasks.completed,
        dead_lettered = stats.tasks.dead_letter,
        "done"
    );
    if stats.tasks.dead_letter > 0 {
        bail!("{} task(s) dead-lettered", stats.tasks.dead_letter);
    }
    Ok(())
}

async fn wait_until_terminal(
    service: &spindle_core::TaskService,
    ids: &[TaskId],
) -> anyhow::Result<Vec<TaskView>> {
    loop {
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            views.push(service.get_status(*id).await?);
        }
        if views.iter().all(|v| v.status.is_terminal()) {
            return Ok(views);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
