//! Derived, render-ready view of an order book.
//!
//! Everything here is a pure function of its input: no I/O, no shared state.
//! Arithmetic stays in exact decimals; [`PriceFormat`] only governs how
//! prices are displayed.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::orderbook::{BookState, OrderBookSide, OrderBookSnapshot};
use crate::types::{PriceLevel, Symbol};

/// Symbol that gets a fixed-width window instead of the book's full range.
const WIDE_WINDOW_SYMBOL: &str = "BTCUSDT";
const WIDE_WINDOW_HALF_WIDTH: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const FALLBACK_HALF_WIDTH: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
/// Levels within 1% of the current price are never dominant.
const DOMINANT_BAND: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
/// Below this current price, display five decimals instead of three.
const SMALL_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Display precision for prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceFormat {
    pub decimals: u32,
}

impl PriceFormat {
    pub fn for_price(current_price: Decimal) -> Self {
        let decimals = if current_price < SMALL_PRICE { 5 } else { 3 };
        Self { decimals }
    }

    pub fn format(&self, price: Decimal) -> String {
        let rounded =
            price.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.prec$}", rounded, prec = self.decimals as usize)
    }
}

/// Inclusive price range a renderer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceWindow {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceWindow {
    pub fn contains(&self, price: Decimal) -> bool {
        self.min <= price && price <= self.max
    }
}

/// Windowed, sorted, annotated order book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedView {
    pub symbol: Symbol,
    /// Strictly descending by price.
    pub bids: Vec<PriceLevel>,
    /// Strictly ascending by price.
    pub asks: Vec<PriceLevel>,
    pub current_price: Decimal,
    pub window: PriceWindow,
    pub dominant_bid: Option<PriceLevel>,
    pub dominant_ask: Option<PriceLevel>,
    pub price_format: PriceFormat,
    pub generated_at: DateTime<Utc>,
}

impl DerivedView {
    /// Levels inside the window on the correct side of the current price:
    /// bids in `[window.min, current_price]`, asks in
    /// `[current_price, window.max]`.
    pub fn levels_in_window(&self) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let bids = self
            .bids
            .iter()
            .filter(|l| self.window.min <= l.price && l.price <= self.current_price)
            .copied()
            .collect();
        let asks = self
            .asks
            .iter()
            .filter(|l| self.current_price <= l.price && l.price <= self.window.max)
            .copied()
            .collect();
        (bids, asks)
    }

    /// Largest volume across both sides, zero for an empty book.
    pub fn peak_volume(&self) -> Decimal {
        self.bids
            .iter()
            .chain(&self.asks)
            .map(|l| l.volume)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn format_price(&self, price: Decimal) -> String {
        self.price_format.format(price)
    }
}

/// Compile a one-shot snapshot. The current price is the snapshot's
/// midpoint, or zero when either side is empty.
pub fn compile_snapshot(snapshot: &OrderBookSnapshot) -> DerivedView {
    let current_price = snapshot.current_price().unwrap_or(Decimal::ZERO);
    compile(&snapshot.symbol, &snapshot.bids, &snapshot.asks, current_price)
}

/// Compile a store read, reusing its cached current price (zero if the store
/// has never seen both sides populated).
pub fn compile_state(state: &BookState, symbol: &Symbol) -> DerivedView {
    let current_price = state.current_price.unwrap_or(Decimal::ZERO);
    compile(symbol, &state.bids, &state.asks, current_price)
}

fn compile(
    symbol: &Symbol,
    bid_side: &OrderBookSide,
    ask_side: &OrderBookSide,
    current_price: Decimal,
) -> DerivedView {
    let bids = bid_side.levels_best_first();
    let asks = ask_side.levels_best_first();
    let window = select_window(symbol, bid_side, ask_side, current_price);

    let threshold = current_price * DOMINANT_BAND;
    let dominant_bid = largest_volume(bids.iter().filter(|l| l.price < current_price - threshold));
    let dominant_ask = largest_volume(asks.iter().filter(|l| l.price > current_price + threshold));

    DerivedView {
        symbol: symbol.clone(),
        bids,
        asks,
        current_price,
        window,
        dominant_bid,
        dominant_ask,
        price_format: PriceFormat::for_price(current_price),
        generated_at: Utc::now(),
    }
}

fn select_window(
    symbol: &Symbol,
    bids: &OrderBookSide,
    asks: &OrderBookSide,
    current_price: Decimal,
) -> PriceWindow {
    if symbol.as_str().eq_ignore_ascii_case(WIDE_WINDOW_SYMBOL) {
        return PriceWindow {
            min: current_price - WIDE_WINDOW_HALF_WIDTH,
            max: current_price + WIDE_WINDOW_HALF_WIDTH,
        };
    }

    let bounds = (
        bids.min_price().zip(asks.min_price()),
        bids.max_price().zip(asks.max_price()),
    );
    match bounds {
        (Some((bid_lo, ask_lo)), Some((bid_hi, ask_hi))) => {
            let min = bid_lo.min(ask_lo);
            let max = bid_hi.max(ask_hi);
            // A stale cached price can sit outside the live levels.
            PriceWindow {
                min: min.min(current_price),
                max: max.max(current_price),
            }
        }
        _ => PriceWindow {
            min: current_price - FALLBACK_HALF_WIDTH,
            max: current_price + FALLBACK_HALF_WIDTH,
        },
    }
}

/// Highest-volume level; on ties the first one wins (nearest the spread,
/// since both sides are iterated best-first).
fn largest_volume<'a>(levels: impl Iterator<Item = &'a PriceLevel>) -> Option<PriceLevel> {
    let mut best: Option<PriceLevel> = None;
    for level in levels {
        let replace = match best {
            Some(b) => level.volume > b.volume,
            None => true,
        };
        if replace {
            best = Some(*level);
        }
    }
    best
}
