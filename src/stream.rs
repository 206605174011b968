//! `depthscope stream`: follow the diff stream and print compiled views at a
//! fixed interval until cancelled.

use std::io;
use std::time::Duration;

use bookdepth::{compile_state, BookConfig, DepthStream, SessionStatus, Symbol};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{StreamArgs, Tuning};
use crate::error::AppError;
use crate::output;

pub async fn run_stream(
    args: &StreamArgs,
    book_config: BookConfig,
    tuning: &Tuning,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let mut stream = DepthStream::new(
        symbol.clone(),
        args.market,
        book_config,
        tuning.stream_config(),
    )?;
    let reader = stream.subscribe();
    let mut status_rx = stream.subscribe_status();
    stream.connect();

    let mut print_interval = time::interval(Duration::from_millis(args.interval_ms.max(1)));
    print_interval.tick().await;

    let result = loop {
        tokio::select! {
            _ = print_interval.tick() => {
                let state = reader.current_snapshot();
                let view = compile_state(&state, &symbol);
                let status = stream.status().to_string();
                let counters = stream.counters();
                let mut out = io::stdout().lock();
                let written = if args.json {
                    output::write_stream_json(&mut out, &view, &status, counters)
                } else {
                    output::write_stream_table(&mut out, &view, &status, counters)
                };
                if let Err(e) = written {
                    break Err(e);
                }
            }
            Ok(()) = status_rx.changed() => {
                let status = status_rx.borrow_and_update().clone();
                info!(%status, "session status");
                if let SessionStatus::Failed(reason) = status {
                    warn!(%reason, "stream session ended");
                    break Err(AppError::SessionFailed(reason));
                }
            }
            _ = cancel.cancelled() => {
                break Ok(());
            }
        }
    };

    stream.shutdown().await;
    info!(counters = ?stream.counters(), "stream finished");
    result
}
