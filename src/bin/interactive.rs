// src/bin/interactive.rs
//
// Terminal front end: a progress bar with percent and ETA, a log pane printed
// above it, and Enter as the start button. The batch runs on a blocking worker;
// this task is the only one that touches the bar.

use anyhow::{anyhow, Result};
use chrono::Local;
use cnpjscraper::{
    batch::{process_file, BatchRunner},
    config::{LookupConfig, RunPaths},
    fetch::LookupClient,
    progress::{format_eta, ProgressEvent},
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const TITLE: &str = "Consulta CNPJ";

fn log_line(pb: &ProgressBar, msg: &str) {
    pb.println(format!("[{}] {}", Local::now().format("%H:%M:%S"), msg));
}

fn render(pb: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::Progress(p) => {
            pb.set_position(p.percent() as u64);
            let eta = p.eta().map(format_eta).unwrap_or_else(|| "--".into());
            pb.set_message(format!("remaining: {}", eta));
        }
        ProgressEvent::Finished { .. } => {
            pb.set_position(100);
            pb.set_message("done ✔");
        }
        _ => {}
    }
    if let Some(msg) = event.message() {
        log_line(pb, &msg);
    }
}

async fn wait_for_enter(lines: &mut Lines<BufReader<Stdin>>) -> Result<()> {
    lines.next_line().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging (quiet by default; the log pane carries progress) ──
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) window ──────────────────────────────────────────────────
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold}\n[{bar:50.green/white}] {pos:>3}%  {msg}")?
            .progress_chars("█▉ "),
    );
    pb.set_prefix(TITLE);
    pb.set_message("remaining: --");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    log_line(&pb, "press Enter to start");
    wait_for_enter(&mut stdin).await?;

    // ─── 3) worker ──────────────────────────────────────────────────
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let paths = RunPaths::default();
    let worker_paths = paths.clone();
    let worker = tokio::task::spawn_blocking(move || -> Result<usize> {
        let client = LookupClient::from_config(LookupConfig::default())?;
        let runner = BatchRunner::new(client);
        process_file(&runner, &worker_paths, tx)
    });
    info!("worker started");

    // ─── 4) render until the worker drops its sender ────────────────
    while let Some(event) = rx.recv().await {
        render(&pb, &event);
    }

    let outcome = worker
        .await
        .map_err(|e| anyhow!("worker stopped unexpectedly: {}", e))
        .and_then(|r| r);
    match outcome {
        Ok(records) => {
            pb.set_message("done ✔");
            log_line(
                &pb,
                &format!("file saved: {} ({} records)", paths.output.display(), records),
            );
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            log_line(&pb, &format!("ERROR: {:#}", e));
        }
    }

    // ─── 5) stay open until dismissed ───────────────────────────────
    log_line(&pb, "press Enter to close");
    wait_for_enter(&mut stdin).await?;
    pb.finish();
    Ok(())
}
