mod cli;
mod dashboard;
mod error;
mod output;
mod stream;

use std::io;

use bookdepth::{request_view, BookConfig, SnapshotFetcher};
use clap::Parser;
use cli::{Cli, Command, Tuning, ViewArgs};
use error::AppError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let cli = Cli::parse();

    // Initialize tracing
    let filter = cli
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv(); // load .env if present

    let cancel = setup_signal_handlers();

    if let Err(e) = run(cli, cancel).await {
        if e.is_fatal() {
            error!(error = %e, "fatal error");
            std::process::exit(1);
        }
        error!(error = %e, "request failed");
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), AppError> {
    let book_config = load_config(&cli.tuning)?;

    match cli.command {
        Command::View(args) => run_view(&args, book_config).await,

        Command::Stream(args) => {
            info!(
                symbol = %args.symbol,
                market = %args.market,
                json = args.json,
                "stream starting"
            );
            stream::run_stream(&args, book_config, &cli.tuning, cancel).await
        }

        Command::Dashboard(args) => {
            dashboard::run_dashboard(&args, book_config, &cli.tuning, cancel).await
        }
    }
}

fn load_config(tuning: &Tuning) -> Result<BookConfig, AppError> {
    let config = BookConfig::from_env().map_err(|e| AppError::Config(e.to_string()))?;
    Ok(tuning.apply(config))
}

/// One on-demand request: print the view, or the reply for a request-scoped
/// failure.
async fn run_view(args: &ViewArgs, book_config: BookConfig) -> Result<(), AppError> {
    let fetcher = SnapshotFetcher::new(book_config)?;
    let result = request_view(&fetcher, args.symbol.as_deref(), args.market).await;

    let mut out = io::stdout().lock();
    match result {
        Ok(view) if args.json => output::write_json(&mut out, &view),
        Ok(view) => output::write_table(&mut out, &view),
        Err(e) if e.is_request_scoped() => {
            output::write_reply(&mut out, &e)?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Register SIGINT and SIGTERM handlers that trigger the returned token.
fn setup_signal_handlers() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            cancel_clone.cancel();
        });
    }

    cancel
}
