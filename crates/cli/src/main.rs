use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vitrine_core::{ImageRef, ItemId, PipelineConfig};
use vitrine_msch::MschInit;
use vitrine_pipeline::{GridLayout, Pipeline, Viewport};
use vitrine_source::HttpSource;

#[derive(Parser, Debug)]
#[command(name = "vitrinectl", version, about = "Vitrine item gallery CLI")]
struct Cli {
    /// Base URL serving /items/*
    #[arg(long = "base-url", env = "VITRINE_BASE_URL", global = true, default_value = "http://127.0.0.1:2000")]
    base_url: String,

    /// HTTP timeout per request
    #[arg(long = "timeout-secs", global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Simulated engine start-up delay
    #[arg(long = "init-delay-ms", global = true, default_value_t = 0)]
    init_delay_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List item identifiers
    Ls,
    /// Load every item, scroll a simulated viewport and report what rendered
    Load {
        /// Viewport height in px
        #[arg(long = "height", default_value_t = 800.0)]
        height: f64,
        /// Tiles per row
        #[arg(long = "columns", default_value_t = 6)]
        columns: usize,
        /// Tile height in px (incl. bar and title)
        #[arg(long = "cell", default_value_t = 160.0)]
        cell: f64,
        /// Scroll positions to visit, in order
        #[arg(long = "scroll")]
        scroll: Vec<f64>,
        /// Directory receiving rendered previews
        #[arg(long = "out")]
        out: Option<PathBuf>,
    },
    /// Show the detail overlay of one item
    Info { id: String },
    /// Save the raw payload of one item as <out>/<id>
    Download {
        id: String,
        #[arg(long = "out", default_value = ".")]
        out: PathBuf,
    },
    /// Print the base64 text of one item's payload
    Copy { id: String },
}

fn init_tracing() {
    let env = std::env::var("VITRINE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("VITRINE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid VITRINE_METRICS_ADDR; expected host:port");
        }
    }
}

fn build_pipeline(cli: &Cli, layout: GridLayout, viewport: Viewport) -> (Pipeline, JoinHandle<()>) {
    let source = Arc::new(HttpSource::with_timeout(&cli.base_url, Duration::from_secs(cli.timeout_secs)));
    let pipeline = Pipeline::new(PipelineConfig::from_env(), source, Arc::new(layout), viewport);
    let init = pipeline.start(Arc::new(MschInit { warmup: Duration::from_millis(cli.init_delay_ms) }));
    (pipeline, init)
}

/// Load a single item and wait until engine work queued for it has run.
async fn load_one(cli: &Cli, id: &str) -> Result<(Pipeline, ItemId)> {
    let id = ItemId::from(id);
    let (pipeline, init) = build_pipeline(cli, GridLayout::new(1, 120.0), Viewport::new(120.0));
    let report = pipeline.run_batch(vec![id.clone()]).await.wait_loaded().await;
    if let Some((_, e)) = report.failed.into_iter().next() {
        return Err(anyhow!(e)).with_context(|| format!("loading {id}"));
    }
    settle(&pipeline, init).await?;
    Ok((pipeline, id))
}

/// Wait for the engine, then for one debounce period so pending checks run.
async fn settle(pipeline: &Pipeline, init: JoinHandle<()>) -> Result<()> {
    init.await.context("engine initializer panicked")?;
    if !pipeline.gate().is_ready() {
        warn!(pending = pipeline.gate().pending(), "engine not ready; previews and metadata stay pending");
    }
    tokio::time::sleep(pipeline.config().debounce() + Duration::from_millis(20)).await;
    Ok(())
}

fn write_preview(dir: &Path, id: &ItemId, img: &ImageRef) -> Result<Option<PathBuf>> {
    let ImageRef::Inline { data, .. } = img else { return Ok(None) };
    let path = dir.join(format!("{id}.{}", img.extension()));
    std::fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(Some(path))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Ls => {
            let source = HttpSource::with_timeout(&cli.base_url, Duration::from_secs(cli.timeout_secs));
            let ids = vitrine_core::ItemSource::list(&source).await.context("listing items")?;
            match cli.output {
                Output::Human => ids.iter().for_each(|id| println!("{id}")),
                Output::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
            }
        }
        Commands::Load { height, columns, cell, scroll, out } => {
            info!(base = %cli.base_url, height, columns, "load invoked");
            let layout = GridLayout::new(*columns, *cell);
            let (pipeline, init) = build_pipeline(&cli, layout, Viewport::new(*height));
            let report = pipeline.load_all().await.context("listing items")?.wait_loaded().await;
            settle(&pipeline, init).await?;
            for y in scroll {
                pipeline.scroll_to(*y);
                tokio::time::sleep(pipeline.config().debounce() + Duration::from_millis(20)).await;
            }
            if let Some(dir) = out {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }

            let mut rows = Vec::new();
            for record in pipeline.records() {
                let img = record.image();
                let preview = match out {
                    Some(dir) if record.is_rendered() => write_preview(dir, record.id(), &img)?,
                    _ => None,
                };
                let failed = report.failed.iter().find(|(id, _)| id == record.id()).map(|(_, e)| e.to_string());
                rows.push(serde_json::json!({
                    "id": record.id(),
                    "name": record.title(),
                    "rendered": record.is_rendered(),
                    "preview": preview.map(|p| p.display().to_string()),
                    "error": failed,
                }));
            }
            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<8} NAME", "ID", "RENDERED");
                    for r in &rows {
                        let name = r["name"].as_str().or(r["error"].as_str()).unwrap_or("-");
                        let rendered = if r["rendered"].as_bool().unwrap_or(false) { "yes" } else { "no" };
                        println!("{:<20} {:<8} {}", r["id"].as_str().unwrap_or(""), rendered, name);
                    }
                    println!(
                        "loaded {} / failed {} / still armed {}",
                        report.loaded.len(),
                        report.failed.len(),
                        pipeline.armed_triggers()
                    );
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Info { id } => {
            let (pipeline, id) = load_one(&cli, id).await?;
            pipeline.open_info(&id)?.await.context("attribution lookup")?;
            let surface = pipeline.surface().ok_or_else(|| anyhow!("overlay closed"))?;
            match cli.output {
                Output::Human => {
                    println!("id:          {}", surface.id);
                    println!("name:        {}", surface.name.as_deref().unwrap_or("-"));
                    println!("description: {}", surface.description.as_deref().unwrap_or("-"));
                    println!("author:      {}", surface.attribution.as_deref().unwrap_or("-"));
                    println!("image:       {}", if surface.image.is_placeholder() { "placeholder" } else { "rendered" });
                }
                Output::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "id": surface.id,
                        "name": surface.name,
                        "description": surface.description,
                        "attribution": surface.attribution,
                        "rendered": !surface.image.is_placeholder(),
                    }))?
                ),
            }
        }
        Commands::Download { id, out } => {
            let (pipeline, id) = load_one(&cli, id).await?;
            let download = pipeline.download(&id)?;
            let path = out.join(&download.file_name);
            std::fs::write(&path, &download.bytes).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), bytes = download.bytes.len(), "payload saved");
        }
        Commands::Copy { id } => {
            let (pipeline, id) = load_one(&cli, id).await?;
            println!("{}", pipeline.copy(&id)?);
        }
    }
    Ok(())
}
