use anyhow::Result;
use cnpjscraper::{
    batch::{process_file, BatchRunner},
    config::{LookupConfig, RunPaths},
    fetch::LookupClient,
    progress::LogSink,
};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) fixed paths + registry client ───────────────────────────
    let paths = RunPaths::default();
    let client = LookupClient::from_config(LookupConfig::default())?;
    let runner = BatchRunner::new(client);

    // ─── 3) look up every row, then write the output once ───────────
    let start = Instant::now();
    match process_file(&runner, &paths, LogSink) {
        Ok(records) => {
            info!(elapsed = ?start.elapsed(), "all done");
            println!(
                "\"{}\" written with {} records.",
                paths.output.display(),
                records
            );
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}
