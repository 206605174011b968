//! View writers for stdout: one JSON object per view, or a text table.

use std::io::Write;

use bookdepth::{BookError, DerivedView, PriceLevel, StreamCounters};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;

/// Levels shown per side in the text table, nearest the spread first.
const TABLE_DEPTH: usize = 20;
/// Width of the volume bar at peak volume.
const BAR_WIDTH: usize = 30;

#[derive(Serialize)]
struct StreamFrame<'a> {
    #[serde(flatten)]
    view: &'a DerivedView,
    status: String,
    counters: StreamCounters,
}

/// Write a view as a single JSON line.
pub fn write_json<W: Write>(writer: &mut W, view: &DerivedView) -> Result<(), AppError> {
    let line = serde_json::to_string(view).map_err(|e| BookError::Render(e.to_string()))?;
    write_line(writer, &line)
}

/// Write a streamed view with session status and counters as a JSON line.
pub fn write_stream_json<W: Write>(
    writer: &mut W,
    view: &DerivedView,
    status: &str,
    counters: StreamCounters,
) -> Result<(), AppError> {
    let frame = StreamFrame {
        view,
        status: status.to_string(),
        counters,
    };
    let line = serde_json::to_string(&frame).map_err(|e| BookError::Render(e.to_string()))?;
    write_line(writer, &line)
}

/// Write a view as a text table: summary, asks (highest on top), spread line,
/// bids. Dominant levels are flagged with `*`.
pub fn write_table<W: Write>(writer: &mut W, view: &DerivedView) -> Result<(), AppError> {
    let mut out = String::new();
    render_table(&mut out, view);
    writer
        .write_all(out.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|e| BookError::Render(e.to_string()))?;
    Ok(())
}

/// Write a streamed view as a status line followed by the text table.
pub fn write_stream_table<W: Write>(
    writer: &mut W,
    view: &DerivedView,
    status: &str,
    counters: StreamCounters,
) -> Result<(), AppError> {
    let mut out = format!(
        "[{status}] received {} applied {} stale {} dropped {} parse failures {} resyncs {}\n",
        counters.received,
        counters.applied,
        counters.stale,
        counters.dropped,
        counters.parse_failures,
        counters.resyncs,
    );
    render_table(&mut out, view);
    out.push('\n');
    writer
        .write_all(out.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|e| BookError::Render(e.to_string()))?;
    Ok(())
}

/// Write the one-line reply for a request-scoped failure.
pub fn write_reply<W: Write>(writer: &mut W, err: &BookError) -> Result<(), AppError> {
    let reply = match err {
        BookError::Unavailable(symbol) => format!("no order book data available for {symbol}"),
        BookError::MalformedInput(hint) => hint.clone(),
        other => other.to_string(),
    };
    write_line(writer, &reply)
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> Result<(), AppError> {
    writeln!(writer, "{line}")
        .and_then(|()| writer.flush())
        .map_err(|e| BookError::Render(e.to_string()))?;
    Ok(())
}

fn render_table(out: &mut String, view: &DerivedView) {
    let fmt = |p: Decimal| view.format_price(p);
    out.push_str(&format!(
        "{}  price {}  window [{}, {}]  {}\n",
        view.symbol,
        fmt(view.current_price),
        fmt(view.window.min),
        fmt(view.window.max),
        view.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ));
    out.push_str(&format!(
        "dominant bid {}  dominant ask {}\n",
        describe(view, view.dominant_bid),
        describe(view, view.dominant_ask),
    ));

    let (bids, asks) = view.levels_in_window();
    let peak = view.peak_volume();

    for level in asks.iter().take(TABLE_DEPTH).rev() {
        push_row(out, view, level, peak, view.dominant_ask.as_ref());
    }
    out.push_str(&format!("  --- {} ---\n", fmt(view.current_price)));
    for level in bids.iter().take(TABLE_DEPTH) {
        push_row(out, view, level, peak, view.dominant_bid.as_ref());
    }
}

fn describe(view: &DerivedView, level: Option<PriceLevel>) -> String {
    match level {
        Some(l) => format!("{} x {}", view.format_price(l.price), l.volume.normalize()),
        None => "-".to_string(),
    }
}

fn push_row(
    out: &mut String,
    view: &DerivedView,
    level: &PriceLevel,
    peak: Decimal,
    dominant: Option<&PriceLevel>,
) {
    let mark = if dominant.is_some_and(|d| d.price == level.price) { '*' } else { ' ' };
    out.push_str(&format!(
        "{mark} {:>16} {:>16} {}\n",
        view.format_price(level.price),
        level.volume.normalize().to_string(),
        bar(level.volume, peak),
    ));
}

/// Horizontal volume bar scaled to the peak volume.
fn bar(volume: Decimal, peak: Decimal) -> String {
    if peak.is_zero() {
        return String::new();
    }
    let ratio = (volume / peak).to_f64().unwrap_or(0.0);
    let len = ((ratio * BAR_WIDTH as f64).round() as usize).clamp(1, BAR_WIDTH);
    "#".repeat(len)
}
