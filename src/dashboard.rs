//! Live order book dashboard using ratatui + crossterm.
//!
//! Polls the streamed store on a fixed interval, compiles a view and draws
//! the levels inside its window around the current price, with volume bars
//! and the dominant levels highlighted.

use std::io::{self, Stdout};
use std::time::Duration;

use bookdepth::{
    compile_state, BookConfig, DepthStream, DerivedView, PriceLevel, SessionStatus,
    StreamCounters, Symbol,
};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{DashboardArgs, Tuning};
use crate::error::AppError;

/// Target render interval (10 FPS).
const RENDER_INTERVAL: Duration = Duration::from_millis(100);

/// Columns taken by the price and volume columns of a book row.
const ROW_TEXT_WIDTH: u16 = 36;

/// Run the dashboard until 'q'/Esc or cancellation.
///
/// # Errors
///
/// [`AppError::Terminal`] if the terminal cannot be set up, or whatever
/// the stream session fails with.
pub async fn run_dashboard(
    args: &DashboardArgs,
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
    stream.connect();
    info!(%symbol, market = %args.market, "starting dashboard");

    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let mut refresh_interval =
        tokio::time::interval(Duration::from_millis(args.refresh_ms.max(1)));
    let mut render_interval = tokio::time::interval(RENDER_INTERVAL);
    let mut view = compile_state(&reader.current_snapshot(), &symbol);

    let mut quit = false;
    let result: Result<(), AppError> = loop {
        if quit {
            break Ok(());
        }

        tokio::select! {
            _ = refresh_interval.tick() => {
                view = compile_state(&reader.current_snapshot(), &symbol);
            }

            // Render tick, also polls keyboard input.
            _ = render_interval.tick() => {
                while event::poll(Duration::ZERO).unwrap_or(false) {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind == KeyEventKind::Press
                            && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                        {
                            quit = true;
                        }
                    }
                }

                let status = stream.status();
                if let SessionStatus::Failed(reason) = &status {
                    break Err(AppError::SessionFailed(reason.clone()));
                }
                if !quit {
                    let counters = stream.counters();
                    let _ = terminal.draw(|frame| {
                        render_ui(frame, &view, args.market.as_str(), &status, &counters);
                    });
                }
            }

            _ = cancel.cancelled() => {
                break Ok(());
            }
        }
    };

    restore_terminal(&mut terminal);
    stream.shutdown().await;

    result
}

/// Restore terminal to normal mode.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) {
    let _ = terminal.show_cursor();
    let _ = disable_raw_mode();
    let _ = io::stdout().execute(LeaveAlternateScreen);
}

// ---------------------------------------------------------------------------
// UI rendering
// ---------------------------------------------------------------------------

fn render_ui(
    frame: &mut Frame,
    view: &DerivedView,
    market: &str,
    status: &SessionStatus,
    counters: &StreamCounters,
) {
    let area = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(area);

    let header_text = format!(" DEPTHSCOPE - {} {market} | 'q' to quit", view.symbol);
    let header = Paragraph::new(header_text)
        .style(Style::default().fg(Color::White).bg(Color::Blue).bold())
        .alignment(Alignment::Center);
    frame.render_widget(header, main_layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(main_layout[1]);

    render_summary(frame, body[0], view, status, counters);
    render_book(frame, body[1], view);
}

fn render_summary(
    frame: &mut Frame,
    area: Rect,
    view: &DerivedView,
    status: &SessionStatus,
    counters: &StreamCounters,
) {
    let status_color = match status {
        SessionStatus::Live => Color::Green,
        SessionStatus::Failed(_) => Color::Red,
        _ => Color::Yellow,
    };
    let dim = Style::default().fg(Color::DarkGray);

    let lines = vec![
        Line::from(vec![
            Span::raw(" Status  "),
            Span::styled(status.to_string(), Style::default().fg(status_color)),
        ]),
        Line::from(format!(" Price   {}", view.format_price(view.current_price))),
        Line::from(format!(
            " Window  {} .. {}",
            view.format_price(view.window.min),
            view.format_price(view.window.max)
        )),
        Line::from(""),
        Line::styled(
            format!(" Max bid {}", describe(view, view.dominant_bid)),
            Style::default().fg(Color::Green),
        ),
        Line::styled(
            format!(" Max ask {}", describe(view, view.dominant_ask)),
            Style::default().fg(Color::Red),
        ),
        Line::from(""),
        Line::styled(format!(" received  {}", counters.received), dim),
        Line::styled(format!(" applied   {}", counters.applied), dim),
        Line::styled(format!(" stale     {}", counters.stale), dim),
        Line::styled(format!(" dropped   {}", counters.dropped), dim),
        Line::styled(format!(" malformed {}", counters.parse_failures), dim),
        Line::styled(format!(" resyncs   {}", counters.resyncs), dim),
        Line::styled(format!(" reconnects {}", counters.reconnects), dim),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Summary ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_book(frame: &mut Frame, area: Rect, view: &DerivedView) {
    // Borders and the spread line take three rows.
    let per_side = (area.height.saturating_sub(3) / 2) as usize;
    let bar_width = area.width.saturating_sub(ROW_TEXT_WIDTH + 2) as usize;
    let lines = book_lines(view, per_side, bar_width);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Order book ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Book rows for the dashboard: the `per_side` window levels nearest the
/// spread on each side, asks on top (highest first), a spread line, then
/// bids. Bars are scaled to the largest volume shown.
fn book_lines(view: &DerivedView, per_side: usize, bar_width: usize) -> Vec<Line<'static>> {
    let (bids, asks) = view.levels_in_window();
    let asks: Vec<PriceLevel> = asks.into_iter().take(per_side).collect();
    let bids: Vec<PriceLevel> = bids.into_iter().take(per_side).collect();
    let peak = asks
        .iter()
        .chain(&bids)
        .map(|l| l.volume)
        .max()
        .unwrap_or(Decimal::ZERO);

    let mut lines = Vec::with_capacity(per_side * 2 + 1);
    for _ in asks.len()..per_side {
        lines.push(Line::from(""));
    }
    for level in asks.iter().rev() {
        let dominant = view.dominant_ask.is_some_and(|d| d.price == level.price);
        lines.push(book_row(view, level, peak, bar_width, Color::Red, dominant));
    }
    lines.push(Line::styled(
        format!("  --- {} ---", view.format_price(view.current_price)),
        Style::default().fg(Color::Yellow),
    ));
    for level in &bids {
        let dominant = view.dominant_bid.is_some_and(|d| d.price == level.price);
        lines.push(book_row(view, level, peak, bar_width, Color::Green, dominant));
    }
    lines
}

fn book_row(
    view: &DerivedView,
    level: &PriceLevel,
    peak: Decimal,
    bar_width: usize,
    color: Color,
    dominant: bool,
) -> Line<'static> {
    let bar_len = if peak.is_zero() {
        0
    } else {
        let ratio = (level.volume / peak).to_f64().unwrap_or(0.0);
        ((ratio * bar_width as f64).round() as usize).clamp(1, bar_width.max(1))
    };
    let mut style = Style::default().fg(color);
    if dominant {
        style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }
    Line::from(vec![
        Span::styled(
            format!(
                "  {:>16} {:>16} ",
                view.format_price(level.price),
                level.volume.normalize().to_string()
            ),
            Style::default().fg(color),
        ),
        Span::styled("█".repeat(bar_len), style),
    ])
}

fn describe(view: &DerivedView, level: Option<PriceLevel>) -> String {
    match level {
        Some(l) => format!("{} ({})", view.format_price(l.price), l.volume.normalize()),
        None => "--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookdepth::{DepthUpdateEvent, OrderBookStore};
    use rust_decimal_macros::dec;

    fn view() -> DerivedView {
        let mut store = OrderBookStore::new();
        store
            .apply_update(&DepthUpdateEvent {
                bids: vec![
                    PriceLevel::new(dec!(100), dec!(1)),
                    PriceLevel::new(dec!(99), dec!(4)),
                    PriceLevel::new(dec!(90), dec!(8)),
                ],
                asks: vec![
                    PriceLevel::new(dec!(101), dec!(2)),
                    PriceLevel::new(dec!(102), dec!(1)),
                    PriceLevel::new(dec!(110), dec!(3)),
                ],
                ..Default::default()
            })
            .unwrap();
        compile_state(&store.current_snapshot(), &Symbol::parse("ETHUSDT").unwrap())
    }

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn book_lines_put_asks_above_spread() {
        let view = view();
        let lines = book_lines(&view, 3, 10);
        assert_eq!(lines.len(), 7);
        assert!(text(&lines[0]).contains("110.000"));
        assert!(text(&lines[2]).contains("101.000"));
        assert!(text(&lines[3]).contains("--- 100.500 ---"));
        assert!(text(&lines[4]).contains("100.000"));
        assert!(text(&lines[6]).contains("90.000"));
    }

    #[test]
    fn book_lines_pad_short_sides_and_scale_bars() {
        let view = view();
        let lines = book_lines(&view, 5, 8);
        // Three asks fill the bottom of a five-row side.
        assert!(text(&lines[0]).is_empty());
        assert!(text(&lines[1]).is_empty());
        // The 90 bid carries the peak volume: full-width bar.
        let last = text(lines.last().unwrap());
        assert!(last.contains("90.000"));
        assert_eq!(last.chars().filter(|&c| c == '█').count(), 8);
    }

    #[test]
    fn dominant_levels_are_highlighted() {
        let view = view();
        assert_eq!(view.dominant_bid.map(|l| l.price), Some(dec!(90)));
        let lines = book_lines(&view, 3, 10);
        let bar = &lines[6].spans[1];
        assert!(bar.style.add_modifier.contains(Modifier::REVERSED));
    }
}
