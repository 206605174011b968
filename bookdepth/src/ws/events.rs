use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BookError, Result};
use crate::types::PriceLevel;

/// A diff of the book: every entry replaces the volume at its price, or
/// removes the price when the volume is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepthUpdateEvent {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// `U`: first update id in the event.
    pub first_update_id: Option<u64>,
    /// `u`: final update id in the event.
    pub final_update_id: Option<u64>,
    /// `pu`: final update id of the previous event (futures only).
    pub prev_final_update_id: Option<u64>,
    /// `E`: event time in epoch milliseconds.
    pub event_time: Option<u64>,
}

/// Binance `<symbol>@depth` payload.
///
/// Field names match the Binance API:
///   e  = event type ("depthUpdate")
///   E  = event time (ms)
///   s  = symbol
///   U  = first update id
///   u  = final update id
///   pu = previous final update id (futures)
///   b  = bid updates `[price, qty]`
///   a  = ask updates `[price, qty]`
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct DiffDepthMsg {
    #[serde(default)]
    e: Option<String>,
    #[serde(default, rename = "E")]
    event_time: Option<u64>,
    #[serde(default)]
    s: Option<String>,
    #[serde(default, rename = "U")]
    first_update_id: Option<u64>,
    #[serde(default)]
    u: Option<u64>,
    #[serde(default)]
    pu: Option<u64>,
    b: Vec<(Decimal, Decimal)>,
    a: Vec<(Decimal, Decimal)>,
}

/// Raw streams send the payload directly; combined streams wrap it as
/// `{"stream": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiffEnvelope {
    Combined { data: DiffDepthMsg },
    Raw(DiffDepthMsg),
}

/// Parse one raw text frame from the diff stream.
///
/// # Errors
///
/// Returns [`BookError::Parse`] if the frame is not a depth diff (including
/// subscription acknowledgements and other control messages).
pub fn parse_depth_update(text: &str) -> Result<DepthUpdateEvent> {
    let envelope: DiffEnvelope = serde_json::from_str(text)
        .map_err(|e| BookError::Parse(format!("not a depth update: {e}")))?;
    let msg = match envelope {
        DiffEnvelope::Combined { data } => data,
        DiffEnvelope::Raw(msg) => msg,
    };

    if let Some(kind) = msg.e.as_deref() {
        if kind != "depthUpdate" {
            return Err(BookError::Parse(format!("unexpected event type \"{kind}\"")));
        }
    }

    Ok(DepthUpdateEvent {
        bids: msg.b.into_iter().map(PriceLevel::from).collect(),
        asks: msg.a.into_iter().map(PriceLevel::from).collect(),
        first_update_id: msg.first_update_id,
        final_update_id: msg.u,
        prev_final_update_id: msg.pu,
        event_time: msg.event_time,
    })
}
