//! Binance diff-depth stream ingestion.
//!
//! A [`DepthStream`] runs two tasks per session:
//!
//! - the network task owns the WebSocket, answers pings, detects dead
//!   connections and pushes every raw text frame onto the handoff queue
//!   without parsing it;
//! - the consumer task drains the queue in receipt order and
//!   is the only writer of the [`OrderBookStore`].
//!
//! Reconnection is an iterative loop driven by a [`ReconnectPolicy`]. Session
//! progress is published as a [`SessionStatus`] through a `watch` channel.

mod consumer;
pub mod events;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::{Backoff, ReconnectPolicy};
use crate::config::{BookConfig, StreamConfig};
use crate::error::{BookError, Result};
use crate::handoff::{self, HandoffSender};
use crate::orderbook::{BookReader, OrderBookStore};
use crate::rest::snapshot::SnapshotFetcher;
use crate::types::{Market, Symbol};

use consumer::{run_consumer, Seeder};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const STALE_THRESHOLD: Duration = Duration::from_secs(60);
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Session status / counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Live,
    /// Waiting for a fresh snapshot after a gap or queue overflow.
    Resyncing,
    Reconnecting {
        attempt: u32,
        #[serde(with = "duration_ms")]
        delay: Duration,
    },
    Stopped,
    Failed(String),
}

impl SessionStatus {
    /// `Stopped` and `Failed` are final: nothing overwrites them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed(_))
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Connecting => f.write_str("connecting"),
            SessionStatus::Live => f.write_str("live"),
            SessionStatus::Resyncing => f.write_str("resyncing"),
            SessionStatus::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {attempt}, in {delay:?})")
            }
            SessionStatus::Stopped => f.write_str("stopped"),
            SessionStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Publish `next` unless the session already reached a terminal state.
pub(crate) fn set_status(tx: &watch::Sender<SessionStatus>, next: SessionStatus) {
    tx.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

/// Running counters shared by both tasks.
#[derive(Debug, Default)]
pub(crate) struct StreamStats {
    pub received: AtomicU64,
    pub applied: AtomicU64,
    pub stale: AtomicU64,
    pub parse_failures: AtomicU64,
    pub dropped: AtomicU64,
    /// Frames skipped while waiting for a snapshot.
    pub discarded: AtomicU64,
    pub resyncs: AtomicU64,
    pub reconnects: AtomicU64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamCounters {
        StreamCounters {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCounters {
    pub received: u64,
    pub applied: u64,
    pub stale: u64,
    pub parse_failures: u64,
    pub dropped: u64,
    pub discarded: u64,
    pub resyncs: u64,
    pub reconnects: u64,
}

// ---------------------------------------------------------------------------
// DepthStream
// ---------------------------------------------------------------------------

/// One streaming session for a (symbol, market) pair.
///
/// Does **not** connect on construction; call [`connect`](Self::connect).
/// Dropping the stream cancels both tasks.
pub struct DepthStream {
    symbol: Symbol,
    market: Market,
    url: String,
    config: StreamConfig,
    fetcher: SnapshotFetcher,
    store: Option<OrderBookStore>,
    reader: BookReader,
    status_tx: watch::Sender<SessionStatus>,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DepthStream {
    pub fn new(
        symbol: Symbol,
        market: Market,
        book_config: BookConfig,
        config: StreamConfig,
    ) -> Result<Self> {
        let url = book_config.stream_url(market, &symbol.stream_name());
        let fetcher = SnapshotFetcher::new(book_config)?;
        let store = OrderBookStore::new();
        let reader = store.subscribe();
        let (status_tx, _) = watch::channel(SessionStatus::Connecting);
        Ok(Self {
            symbol,
            market,
            url,
            config,
            fetcher,
            store: Some(store),
            reader,
            status_tx,
            stats: Arc::new(StreamStats::default()),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Spawn the network and consumer tasks. Calling it twice is a no-op.
    pub fn connect(&mut self) {
        let Some(store) = self.store.take() else {
            warn!(symbol = %self.symbol, "depth stream already connected");
            return;
        };

        let (tx, rx) = handoff::channel(self.config.queue_capacity);
        let seeder = self.config.seed_from_snapshot.then(|| Seeder {
            fetcher: self.fetcher.clone(),
            symbol: self.symbol.clone(),
            market: self.market,
            retry_delay: self.config.reconnect.base,
        });

        info!(
            symbol = %self.symbol,
            market = %self.market,
            url = %self.url,
            seed = self.config.seed_from_snapshot,
            "depth stream starting"
        );

        self.tasks.push(tokio::spawn(run_consumer(
            rx,
            store,
            seeder,
            self.status_tx.clone(),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(run_network(
            self.url.clone(),
            tx,
            self.config.reconnect.clone(),
            self.status_tx.clone(),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        )));
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Read handle onto the store this session maintains.
    pub fn subscribe(&self) -> BookReader {
        self.reader.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn counters(&self) -> StreamCounters {
        self.stats.snapshot()
    }

    /// Signal both tasks to stop. Returns immediately.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Close and wait for both tasks to finish.
    pub async fn shutdown(&mut self) {
        self.close();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "depth stream task panicked");
            }
        }
    }
}

impl Drop for DepthStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Network task
// ---------------------------------------------------------------------------

async fn run_network(
    url: String,
    tx: HandoffSender,
    policy: ReconnectPolicy,
    status_tx: watch::Sender<SessionStatus>,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
) {
    let mut backoff = policy.backoff();

    loop {
        set_status(&status_tx, SessionStatus::Connecting);
        match run_single_connection(&url, &tx, &status_tx, &stats, &mut backoff, &cancel).await {
            Ok(()) => {
                info!("depth stream stopped gracefully");
                break;
            }
            Err(e) => {
                error!(error = %e, "depth stream connection error");
                if cancel.is_cancelled() {
                    break;
                }
                let Some(delay) = backoff.next_delay() else {
                    let err = BookError::ReconnectExhausted(backoff.attempt());
                    error!(error = %err, "depth stream giving up");
                    set_status(&status_tx, SessionStatus::Failed(err.to_string()));
                    cancel.cancel();
                    return;
                };
                let attempt = backoff.attempt();
                stats.reconnects.fetch_add(1, Ordering::Relaxed);
                info!(attempt, delay = ?delay, "reconnecting depth stream");
                set_status(&status_tx, SessionStatus::Reconnecting { attempt, delay });
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        info!("shutdown during reconnect wait");
                        break;
                    }
                }
            }
        }
    }

    set_status(&status_tx, SessionStatus::Stopped);
}

/// One WebSocket connection. Returns `Ok` only on cancellation.
async fn run_single_connection(
    url: &str,
    tx: &HandoffSender,
    status_tx: &watch::Sender<SessionStatus>,
    stats: &StreamStats,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<()> {
    let (ws_stream, _) = tokio::select! {
        res = tokio_tungstenite::connect_async(url) => res?,
        _ = cancel.cancelled() => return Ok(()),
    };
    let (mut sink, mut stream) = ws_stream.split();
    backoff.reset();
    set_status(status_tx, SessionStatus::Live);
    info!(url, "depth stream connected");

    let mut last_message_time = Instant::now();
    let mut ping_interval = time::interval(PING_INTERVAL);
    ping_interval.tick().await;
    let mut stale_interval = time::interval(STALE_CHECK_INTERVAL);
    stale_interval.tick().await;
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let pong_timeout_fut = match pong_deadline {
            Some(d) => time::sleep_until(d),
            None => time::sleep_until(Instant::now() + Duration::from_secs(86400)),
        };
        let pong_active = pong_deadline.is_some();

        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_message_time = Instant::now();
                        stats.received.fetch_add(1, Ordering::Relaxed);
                        tx.send(text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_message_time = Instant::now();
                        sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_message_time = Instant::now();
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(_))) => return Err(BookError::ConnectionClosed),
                    Some(Ok(_)) => { last_message_time = Instant::now(); }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(BookError::ConnectionClosed),
                }
            }
            _ = ping_interval.tick() => {
                sink.send(Message::Ping(vec![])).await?;
                pong_deadline = Some(Instant::now() + PONG_TIMEOUT);
            }
            _ = stale_interval.tick() => {
                let elapsed = last_message_time.elapsed();
                if elapsed > STALE_THRESHOLD {
                    return Err(BookError::StaleConnection(elapsed.as_millis() as u64));
                }
            }
            _ = pong_timeout_fut, if pong_active => {
                return Err(BookError::PongTimeout);
            }
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}
