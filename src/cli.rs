use crate::model::{ResultRecord, SessionConfig, SessionEvent};
use crate::publisher::{PublishInput, ResultPublisher, Scenario, StatusBoard};
use crate::report::{build_text_summary, export_json, Report};
use crate::server::{ApiConfig, ApiServer};
use crate::session::{CapturedImage, SessionController};
use crate::store::{FileStore, HttpStore, MemoryStore, ResultStore};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_URL: &str = "http://127.0.0.1:3000";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (mpsc::UnboundedSender<OutputLine>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "hairscan",
    version,
    about = "Hair-density analysis sessions with operator result handoff"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the backend holding the shared result slot
    Serve {
        /// Listen address
        #[arg(long, env = "HAIRSCAN_ADDR", default_value = "127.0.0.1:3000")]
        addr: String,

        /// JSON file backing the result slot
        #[arg(long, env = "HAIRSCAN_DATA_FILE", default_value = "data.json")]
        data_file: PathBuf,

        /// Keep the slot in memory only; it is lost on exit
        #[arg(long)]
        in_memory: bool,
    },
    /// Publish an operator result into the slot
    Publish(PublishArgs),
    /// Run one analysis session for an image and print the report
    Analyze(AnalyzeArgs),
    /// Print the operator status and the raw slot content
    Peek {
        #[arg(long, env = "HAIRSCAN_URL", default_value = DEFAULT_URL)]
        url: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct PublishArgs {
    /// Backend base URL
    #[arg(long, env = "HAIRSCAN_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Preset filling hair count and confidence
    #[arg(long, value_enum)]
    pub scenario: Option<Scenario>,

    /// Hair count; the leading integer is used and must be 5000 to 200000
    #[arg(long)]
    pub hair_count: Option<String>,

    /// Confidence percentage; values above 100 are clamped
    #[arg(long)]
    pub confidence: Option<String>,

    /// Category: low, medium or good
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub image_quality: Option<String>,

    /// Free-form note carried with the result
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Image file to analyze
    pub image: PathBuf,

    /// Backend base URL
    #[arg(long, env = "HAIRSCAN_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// MIME type override (inferred from the extension otherwise)
    #[arg(long)]
    pub mime: Option<String>,

    /// Interval between result slot reads
    #[arg(long, default_value = "2s")]
    pub poll_interval: humantime::Duration,

    /// Wait after processing ends for an operator result before a simulated one is used
    #[arg(long, default_value = "30s")]
    pub fallback_ceiling: humantime::Duration,

    /// Minimum duration of each processing step
    #[arg(long, default_value = "1200ms")]
    pub stage_min: humantime::Duration,

    /// Random extra duration per processing step
    #[arg(long, default_value = "800ms")]
    pub stage_jitter: humantime::Duration,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Export the report document as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Serve {
            addr,
            data_file,
            in_memory,
        } => run_serve(addr, data_file, in_memory).await,
        Command::Publish(args) => run_publish(args).await,
        Command::Analyze(args) => run_analyze(args).await,
        Command::Peek { url } => run_peek(&url).await,
    }
}

/// Build a `SessionConfig` from CLI arguments.
pub fn build_session_config(args: &AnalyzeArgs) -> SessionConfig {
    SessionConfig {
        poll_interval: Duration::from(args.poll_interval),
        fallback_ceiling: Duration::from(args.fallback_ceiling),
        stage_min: Duration::from(args.stage_min),
        stage_jitter: Duration::from(args.stage_jitter),
        ..SessionConfig::default()
    }
}

async fn run_serve(addr: String, data_file: PathBuf, in_memory: bool) -> Result<()> {
    let cfg = ApiConfig { addr };
    let handle = if in_memory {
        log::info!("result slot held in memory; it is lost on exit");
        ApiServer::new(cfg, Arc::new(MemoryStore::new()), StatusBoard::new())
            .spawn()
            .await?
    } else {
        let store = Arc::new(FileStore::new(data_file));
        log::info!("result slot persisted to {}", store.path().display());
        ApiServer::new(cfg, store, StatusBoard::new()).spawn().await?
    };
    log::info!("serving result slot on http://{}", handle.addr);
    tokio::signal::ctrl_c()
        .await
        .context("wait for ctrl-c")?;
    log::info!("shutting down");
    handle.stop().await
}

async fn run_publish(args: PublishArgs) -> Result<()> {
    let store = Arc::new(HttpStore::new(&args.url, HTTP_TIMEOUT)?);
    let publisher = ResultPublisher::new(store.clone(), StatusBoard::new());
    let input = PublishInput {
        scenario: args.scenario,
        hair_count: args.hair_count,
        confidence: args.confidence,
        category: args.category,
        image_quality: args.image_quality,
        custom_message: args.message,
    };

    let published = publisher.publish(&input).await;
    if let Err(e) = store.post_status(&publisher.status().current()).await {
        log::warn!("status update not delivered: {e}");
    }
    let record = published.context("publish result")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_peek(url: &str) -> Result<()> {
    let store = HttpStore::new(url, HTTP_TIMEOUT)?;
    match store.fetch_status().await {
        Ok(Some(status)) => eprintln!(
            "operator status: {} (ready: {})",
            status.message, status.is_ready
        ),
        Ok(None) => {}
        Err(e) => log::debug!("status unavailable: {e}"),
    }
    let Some(value) = store.get().await.context("read result slot")? else {
        println!("(empty)");
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    match ResultRecord::from_value(&value) {
        Some(r) => eprintln!(
            "well-formed: {} hairs, {}% confidence",
            r.hair_count, r.confidence
        ),
        None => eprintln!("not a well-formed result; sessions keep polling"),
    }
    Ok(())
}

/// Mirror local status changes to the backend's status route.
fn spawn_status_forwarder(store: Arc<HttpStore>, board: &StatusBoard) -> JoinHandle<()> {
    let mut rx = board.subscribe();
    tokio::spawn(async move {
        loop {
            let status = rx.borrow_and_update().clone();
            if let Err(e) = store.post_status(&status).await {
                log::debug!("status update not delivered: {e}");
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

fn render_event(out: &mpsc::UnboundedSender<OutputLine>, ev: &SessionEvent) {
    let line = match ev {
        SessionEvent::PhaseChanged { phase } => format!("== {phase:?} =="),
        SessionEvent::Stage {
            index,
            total,
            label,
            progress,
        } => format!("[{}/{total}] {label} ({progress}%)", (index + 1).min(*total)),
        SessionEvent::Info(info) => info.to_message(),
        SessionEvent::Completed { .. } => return,
    };
    let _ = out.send(OutputLine::Stderr(line));
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let store = Arc::new(HttpStore::new(&args.url, HTTP_TIMEOUT)?);
    let status = StatusBoard::new();
    let forwarder = spawn_status_forwarder(store.clone(), &status);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let controller = SessionController::new(
        store.clone(),
        build_session_config(&args),
        evt_tx,
        status.clone(),
    );

    controller.begin_capture().await?;
    let image = match CapturedImage::from_path(&args.image, args.mime.as_deref()).await {
        Ok(image) => image,
        Err(e) => {
            controller.report_camera_failure(&format!("{e:#}")).await?;
            while let Ok(ev) = evt_rx.try_recv() {
                render_event(&out_tx, &ev);
            }
            forwarder.abort();
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };
    controller
        .submit_image(image)
        .await
        .with_context(|| format!("submit {}", args.image.display()))?;
    if let Some(image) = controller.pending_image().await {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Uploaded {} ({} bytes, {})",
            image.name.as_deref().unwrap_or("image"),
            image.size(),
            image.mime
        )));
    }

    let outcome: Result<Report> = loop {
        tokio::select! {
            ev = evt_rx.recv() => match ev {
                Some(SessionEvent::Completed { report }) => break Ok(*report),
                Some(ev) => render_event(&out_tx, &ev),
                None => break Err(anyhow!("session ended without a result")),
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("analysis cancelled while {:?}", controller.phase().await);
                controller.reset().await;
                break Err(anyhow!("analysis cancelled"));
            }
        }
    };

    log::debug!("session finished: {:?}", controller.snapshot().await);
    forwarder.abort();
    if let Err(e) = store.post_status(&status.current()).await {
        log::debug!("status update not delivered: {e}");
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    if let Some(p) = args.export_json.as_deref() {
        export_json(p, &report)?;
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }
    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    } else {
        for line in build_text_summary(&report) {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
