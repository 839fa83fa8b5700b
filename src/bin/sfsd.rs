//! sfsd - serve files from one directory to sfs clients

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use sfs::cli::ServerOpts;
use sfs::log::TransferLog;
use sfs::logger::{Logger, MultiLogger, NoopLogger, TextLogger};

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        println!("\nExiting...");
        std::process::exit(0);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = ServerOpts::parse();
    let quiet = opts.quiet;
    let log_file = opts.log_file.clone();
    let text_log = opts.text_log.clone();
    let config = opts.into_config()?;

    let mut sinks = MultiLogger::new();
    if !quiet {
        sinks.push(Arc::new(TextLogger::stdout()));
    }
    if let Some(ref path) = text_log {
        let file_logger = TextLogger::file(path)
            .with_context(|| format!("can't open log file {}", path.display()))?;
        sinks.push(Arc::new(file_logger));
    }
    if let Some(ref path) = log_file {
        sinks.push(Arc::new(TransferLog::new(path)));
    }
    let logger: Arc<dyn Logger> = if sinks.is_empty() {
        Arc::new(NoopLogger)
    } else {
        Arc::new(sinks)
    };

    if config.bind.ip().is_unspecified() {
        eprintln!("WARNING: serving UNENCRYPTED and UNAUTHENTICATED on all interfaces");
        eprintln!("   Only use on trusted networks (LAN)");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(sfs::net_async::server::serve(config, logger))
}
