//! rzsync - differential file transfer over HTTP range requests

use clap::Parser;
use rzsync::cli::{Cli, Commands, MakeArgs, SyncArgs};
use rzsync::control::{self, codec, GenerateOptions};
use rzsync::events::{StatsObserver, ZsyncObserver};
use rzsync::progress::{print_summary, ProgressObserver};
use rzsync::{Options, Zsync};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json);

    match cli.command {
        Commands::Sync(args) => run_sync(args).await,
        Commands::Make(args) => run_make(args),
    }
}

async fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    let stats = StatsObserver::new();
    let mut observers: Vec<Box<dyn ZsyncObserver>> = vec![Box::new(stats.clone())];
    if !args.no_progress && !args.quiet {
        observers.push(Box::new(ProgressObserver::new(true)));
    }

    let options = Options {
        inputs: args.inputs,
        output: args.output,
        url: args.url.as_deref().map(Url::parse).transpose()?,
    };

    let zsync = Zsync::with_observers(observers);

    // Cancel the running assembly on Ctrl+C
    let cancel = zsync.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling...");
            cancel.cancel();
        }
    });

    let target = zsync.sync(&args.control, &options).await?;
    tracing::info!(target = %target.display(), "Sync complete");

    if !args.quiet {
        let length = std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        print_summary(&stats.snapshot(), length);
    }
    Ok(())
}

fn run_make(args: MakeArgs) -> anyhow::Result<()> {
    let options = GenerateOptions {
        block_size: args.block_size,
        url: args.url,
        filename: args.filename,
    };
    let control = control::generate(&args.file, &options)?;

    let output = args.output.unwrap_or_else(|| {
        let mut name = args
            .file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".zsync");
        args.file.with_file_name(name)
    });
    std::fs::write(&output, codec::encode(&control))?;

    tracing::info!(
        output = %output.display(),
        blocks = control.header.block_count(),
        block_size = control.header.block_size,
        "Control file written"
    );
    Ok(())
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("rzsync=info"),
        1 => EnvFilter::new("rzsync=debug"),
        2 => EnvFilter::new("rzsync=trace"),
        _ => EnvFilter::new("trace"),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}
