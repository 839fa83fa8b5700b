//! sfs - download one file from an sfsd daemon
//!
//! `sfs -f <file>` fetches a fresh copy; `sfs -c -f <file>` continues a partial
//! download from the local file's current size.

use anyhow::{Context, Result};
use clap::Parser;

use sfs::cli::ClientOpts;
use sfs::net_async::client;

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nExiting...");
        std::process::exit(0);
    })
    .context("Error setting Ctrl-C handler")?;

    let config = ClientOpts::parse().into_config()?;

    // Sequential session; a current-thread runtime is enough
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let summary = rt.block_on(client::fetch(&config))?;

    if summary.offset > 0 {
        println!(
            "{}: {} bytes received (resumed at {}), {} bytes on disk",
            summary.local_path.display(),
            summary.stats.bytes,
            summary.offset,
            summary.local_size()
        );
    } else {
        println!(
            "{}: {} bytes received",
            summary.local_path.display(),
            summary.stats.bytes
        );
    }
    if summary.stats.interrupted {
        eprintln!("warning: connection dropped mid-transfer; run again with -c to resume");
    }
    Ok(())
}
