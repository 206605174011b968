//! Consumer half of the depth stream: the single writer of the store.
//!
//! Pops raw frames from the handoff queue in receipt order, parses them and
//! applies them to the [`OrderBookStore`]. When seeding is enabled the store
//! is (re)built from a REST snapshot on the first frame, after a sequence
//! gap, and after the queue overflowed.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BookError;
use crate::handoff::{Handoff, HandoffReceiver};
use crate::orderbook::{ApplyOutcome, OrderBookStore};
use crate::rest::snapshot::SnapshotFetcher;
use crate::types::{Market, Symbol};
use crate::ws::events::parse_depth_update;
use crate::ws::{set_status, SessionStatus, StreamStats};

/// Where the consumer gets snapshots from when it has to (re)seed.
#[derive(Debug, Clone)]
pub(crate) struct Seeder {
    pub fetcher: SnapshotFetcher,
    pub symbol: Symbol,
    pub market: Market,
    /// Minimum spacing between snapshot attempts.
    pub retry_delay: Duration,
}

pub(crate) async fn run_consumer(
    mut rx: HandoffReceiver,
    mut store: OrderBookStore,
    seeder: Option<Seeder>,
    status_tx: watch::Sender<SessionStatus>,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
) {
    let mut needs_seed = seeder.is_some();
    let mut last_seed_attempt: Option<Instant> = None;

    loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            _ = cancel.cancelled() => {
                let discarded = rx.discard();
                debug!(discarded, "consumer shutting down");
                break;
            }
        };

        let raw = match item {
            Some(Handoff::Message(raw)) => raw,
            Some(Handoff::Dropped(n)) => {
                stats.dropped.fetch_add(n, Ordering::Relaxed);
                warn!(dropped = n, "handoff queue overflowed, oldest updates lost");
                if seeder.is_some() {
                    needs_seed = true;
                    set_status(&status_tx, SessionStatus::Resyncing);
                }
                continue;
            }
            None => {
                debug!("handoff queue closed");
                break;
            }
        };

        if needs_seed {
            if let Some(seeder) = &seeder {
                let throttled = last_seed_attempt
                    .is_some_and(|at| at.elapsed() < seeder.retry_delay);
                if throttled {
                    stats.discarded.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                last_seed_attempt = Some(Instant::now());

                let fetched = tokio::select! {
                    res = seeder.fetcher.fetch_snapshot(&seeder.symbol, seeder.market) => res,
                    _ = cancel.cancelled() => {
                        let discarded = rx.discard();
                        debug!(discarded, "consumer shutting down during seed");
                        break;
                    }
                };
                match fetched {
                    Ok(snapshot) => {
                        store.seed(&snapshot);
                        needs_seed = false;
                        stats.resyncs.fetch_add(1, Ordering::Relaxed);
                        set_status(&status_tx, SessionStatus::Live);
                        info!(
                            symbol = %seeder.symbol,
                            last_update_id = ?snapshot.last_update_id,
                            "store seeded from snapshot"
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "snapshot for seeding failed, will retry");
                        stats.discarded.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                }
            }
        }

        let event = match parse_depth_update(&raw) {
            Ok(event) => event,
            Err(e) => {
                let failures = stats.parse_failures.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(error = %e, failures, "discarding malformed depth message");
                continue;
            }
        };

        match store.apply_update(&event) {
            Ok(ApplyOutcome::Applied) => {
                stats.applied.fetch_add(1, Ordering::Relaxed);
            }
            Ok(ApplyOutcome::Stale) => {
                stats.stale.fetch_add(1, Ordering::Relaxed);
            }
            Err(e @ BookError::SequenceGap { .. }) if seeder.is_some() => {
                warn!(error = %e, "depth sequence broken, resyncing");
                needs_seed = true;
                set_status(&status_tx, SessionStatus::Resyncing);
            }
            Err(e) => {
                // Without a snapshot source the best we can do is re-anchor on
                // this event and carry on.
                warn!(error = %e, "depth sequence broken, re-anchoring");
                store.clear_sequence();
                if store.apply_update(&event).is_ok() {
                    stats.applied.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
