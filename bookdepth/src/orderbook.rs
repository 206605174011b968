//! Local order book maintained from REST snapshots and diff-depth events.
//!
//! The [`OrderBookStore`] is owned by exactly one task (the stream
//! consumer), which is the only writer. After every fully applied event the
//! store publishes an immutable [`BookState`] through a `tokio::sync::watch`
//! channel, so readers never observe half of an update.
//!
//! ```text
//!   DepthUpdateEvent ──> OrderBookStore (single writer, &mut self)
//!                               |
//!                   watch::Sender<Arc<BookState>>
//!                               |
//!                  BookReader::current_snapshot()  (any number of readers)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{BookError, Result};
use crate::types::{DepthSnapshotResponse, Market, PriceLevel, Symbol};
use crate::ws::events::DepthUpdateEvent;

// ---------------------------------------------------------------------------
// OrderBookSide
// ---------------------------------------------------------------------------

/// One side of the book. Keys are unique prices; ordering is imposed at read
/// time (bids best-first = descending, asks best-first = ascending).
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBookSide {
    levels: BTreeMap<Decimal, Decimal>,
    /// `true` for the ask side, `false` for the bid side.
    is_ask: bool,
}

impl OrderBookSide {
    pub fn bids() -> Self {
        Self {
            levels: BTreeMap::new(),
            is_ask: false,
        }
    }

    pub fn asks() -> Self {
        Self {
            levels: BTreeMap::new(),
            is_ask: true,
        }
    }

    pub fn is_ask(&self) -> bool {
        self.is_ask
    }

    /// Apply diff entries in order. Zero volume removes the price; any other
    /// volume replaces what was there.
    pub fn apply(&mut self, entries: &[PriceLevel]) {
        for entry in entries {
            if entry.volume.is_zero() {
                self.levels.remove(&entry.price);
            } else {
                self.levels.insert(entry.price, entry.volume);
            }
        }
    }

    /// Replace all levels. Zero-volume entries are ignored.
    pub fn set_snapshot(&mut self, entries: &[PriceLevel]) {
        self.levels.clear();
        for entry in entries {
            if !entry.volume.is_zero() {
                self.levels.insert(entry.price, entry.volume);
            }
        }
    }

    /// Top-of-book price: highest bid or lowest ask.
    pub fn best(&self) -> Option<Decimal> {
        if self.is_ask {
            self.levels.keys().next().copied()
        } else {
            self.levels.keys().next_back().copied()
        }
    }

    pub fn volume_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    pub fn contains(&self, price: Decimal) -> bool {
        self.levels.contains_key(&price)
    }

    pub fn min_price(&self) -> Option<Decimal> {
        self.levels.keys().next().copied()
    }

    pub fn max_price(&self) -> Option<Decimal> {
        self.levels.keys().next_back().copied()
    }

    /// Levels best-first: descending for bids, ascending for asks.
    pub fn levels_best_first(&self) -> Vec<PriceLevel> {
        let pairs = self.levels.iter().map(|(&p, &v)| PriceLevel::new(p, v));
        if self.is_ask {
            pairs.collect()
        } else {
            pairs.rev().collect()
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// `(best_bid + best_ask) / 2`, if both sides have a level.
pub fn midpoint(bids: &OrderBookSide, asks: &OrderBookSide) -> Option<Decimal> {
    match (bids.best(), asks.best()) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// OrderBookSnapshot
// ---------------------------------------------------------------------------

/// Immutable full book returned by the snapshot fetcher.
#[derive(Clone, Debug)]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    pub market: Market,
    pub bids: OrderBookSide,
    pub asks: OrderBookSide,
    /// Sequence id the snapshot corresponds to, when the venue reports one.
    pub last_update_id: Option<u64>,
}

impl OrderBookSnapshot {
    pub fn from_response(symbol: Symbol, market: Market, response: DepthSnapshotResponse) -> Self {
        let mut bids = OrderBookSide::bids();
        let mut asks = OrderBookSide::asks();
        bids.set_snapshot(&to_levels(&response.bids));
        asks.set_snapshot(&to_levels(&response.asks));
        Self {
            symbol,
            market,
            bids,
            asks,
            last_update_id: response.last_update_id,
        }
    }

    /// Both sides empty: nothing worth rendering.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn current_price(&self) -> Option<Decimal> {
        midpoint(&self.bids, &self.asks)
    }
}

fn to_levels(pairs: &[(Decimal, Decimal)]) -> Vec<PriceLevel> {
    pairs.iter().copied().map(PriceLevel::from).collect()
}

// ---------------------------------------------------------------------------
// BookState / BookReader
// ---------------------------------------------------------------------------

/// Consistent view of the store after some prefix of applied updates.
#[derive(Clone, Debug)]
pub struct BookState {
    pub bids: OrderBookSide,
    pub asks: OrderBookSide,
    /// Last known midpoint. `None` only until both sides have been non-empty
    /// at least once.
    pub current_price: Option<Decimal>,
    pub last_update_id: Option<u64>,
    /// Number of events applied since the store was created.
    pub updates_applied: u64,
}

impl BookState {
    fn empty() -> Self {
        Self {
            bids: OrderBookSide::bids(),
            asks: OrderBookSide::asks(),
            current_price: None,
            last_update_id: None,
            updates_applied: 0,
        }
    }
}

/// Read handle for a store. Cheap to clone; every call returns the latest
/// fully applied state.
#[derive(Clone, Debug)]
pub struct BookReader {
    rx: watch::Receiver<Arc<BookState>>,
}

impl BookReader {
    pub fn current_snapshot(&self) -> Arc<BookState> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next published state. Errors once the store is dropped.
    pub async fn changed(&mut self) -> Result<Arc<BookState>> {
        self.rx
            .changed()
            .await
            .map_err(|_| BookError::ConnectionClosed)?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}

// ---------------------------------------------------------------------------
// OrderBookStore
// ---------------------------------------------------------------------------

/// What happened to an event passed to [`OrderBookStore::apply_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already covered by the seeded snapshot or an earlier event.
    Stale,
}

/// The mutable book for one streaming session.
#[derive(Debug)]
pub struct OrderBookStore {
    bids: OrderBookSide,
    asks: OrderBookSide,
    current_price: Option<Decimal>,
    last_update_id: Option<u64>,
    /// Set by [`seed`](Self::seed): the next sequenced event only has to
    /// straddle the snapshot id rather than chain onto it.
    awaiting_first: bool,
    updates_applied: u64,
    state_tx: watch::Sender<Arc<BookState>>,
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookStore {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(Arc::new(BookState::empty()));
        Self {
            bids: OrderBookSide::bids(),
            asks: OrderBookSide::asks(),
            current_price: None,
            last_update_id: None,
            awaiting_first: false,
            updates_applied: 0,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> BookReader {
        BookReader {
            rx: self.state_tx.subscribe(),
        }
    }

    /// Latest published state.
    pub fn current_snapshot(&self) -> Arc<BookState> {
        Arc::clone(&self.state_tx.borrow())
    }

    pub fn last_update_id(&self) -> Option<u64> {
        self.last_update_id
    }

    /// Replace both sides with a REST snapshot and start sequence tracking
    /// from its `last_update_id`.
    pub fn seed(&mut self, snapshot: &OrderBookSnapshot) {
        self.bids = snapshot.bids.clone();
        self.asks = snapshot.asks.clone();
        self.last_update_id = snapshot.last_update_id;
        self.awaiting_first = snapshot.last_update_id.is_some();
        self.refresh_price();
        self.publish();
        debug!(
            symbol = %snapshot.symbol,
            bids = self.bids.len(),
            asks = self.asks.len(),
            last_update_id = ?self.last_update_id,
            "store seeded"
        );
    }

    /// Apply one diff event: bids first, then asks, then recompute the
    /// current price. Nothing is mutated when the event is stale or breaks
    /// sequence continuity.
    ///
    /// # Errors
    ///
    /// [`BookError::SequenceGap`] when the event does not chain onto the last
    /// applied one. The caller is expected to re-seed the store.
    pub fn apply_update(&mut self, event: &DepthUpdateEvent) -> Result<ApplyOutcome> {
        if self.check_sequence(event)? == ApplyOutcome::Stale {
            return Ok(ApplyOutcome::Stale);
        }

        self.bids.apply(&event.bids);
        self.asks.apply(&event.asks);
        if let Some(id) = event.final_update_id {
            self.last_update_id = Some(id);
            self.awaiting_first = false;
        }
        self.refresh_price();
        self.updates_applied += 1;
        self.publish();
        Ok(ApplyOutcome::Applied)
    }

    /// Forget sequence tracking but keep the levels. The next sequenced event
    /// is accepted as-is and becomes the new anchor.
    pub fn clear_sequence(&mut self) {
        self.last_update_id = None;
        self.awaiting_first = false;
    }

    fn check_sequence(&self, event: &DepthUpdateEvent) -> Result<ApplyOutcome> {
        let (Some(last), Some(final_id)) = (self.last_update_id, event.final_update_id) else {
            return Ok(ApplyOutcome::Applied);
        };

        if final_id <= last {
            return Ok(ApplyOutcome::Stale);
        }

        let first_id = event.first_update_id.unwrap_or(final_id);
        if self.awaiting_first {
            // First event after a snapshot must straddle it.
            if first_id > last + 1 {
                return Err(BookError::SequenceGap {
                    expected: last + 1,
                    got: first_id,
                });
            }
            return Ok(ApplyOutcome::Applied);
        }

        match event.prev_final_update_id {
            Some(prev) if prev != last => Err(BookError::SequenceGap {
                expected: last,
                got: prev,
            }),
            Some(_) => Ok(ApplyOutcome::Applied),
            None if first_id > last + 1 => Err(BookError::SequenceGap {
                expected: last + 1,
                got: first_id,
            }),
            None => Ok(ApplyOutcome::Applied),
        }
    }

    fn refresh_price(&mut self) {
        if let Some(mid) = midpoint(&self.bids, &self.asks) {
            self.current_price = Some(mid);
        }
    }

    fn publish(&self) {
        let state = BookState {
            bids: self.bids.clone(),
            asks: self.asks.clone(),
            current_price: self.current_price,
            last_update_id: self.last_update_id,
            updates_applied: self.updates_applied,
        };
        self.state_tx.send_replace(Arc::new(state));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
