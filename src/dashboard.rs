/// dashboard.rs – ratatui live terminal dashboard.
///
/// Layout (5 panels):
///  ┌─ Header ──────────────────────────────────────────────────────────┐
///  │ Bot Deck │ Up │ Balance │ Total │ Cycle │ SSE status │ keys       │
///  ├─ Trade Timeline ──────────────────────────────────────────────────┤
///  │ buy/sell scatter chart over time                                  │
///  ├─ Recent Trades ───────────────┬─ Notices ─────────────────────────┤
///  │ last N merged trades          │ short-lived trade notifications   │
///  │                               ├─ Logs ────────────────────────────┤
///  │                               │ timestamped log lines             │
///  └───────────────────────────────┴───────────────────────────────────┘
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io::{self, Stdout};

use crate::models::{AppState, ConnectionState, TradeSide};
use crate::timeline::TradeTimeline;

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

/// What a key press asks the main loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Refresh,
    StartBot,
    StopBot,
    None,
}

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key event handling
// ---------------------------------------------------------------------------

pub fn handle_event(event: &Event) -> Action {
    let Event::Key(k) = event else {
        return Action::None;
    };
    match k.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
        KeyCode::Char('c')
            if k.modifiers
                .contains(crossterm::event::KeyModifiers::CONTROL) =>
        {
            Action::Quit
        }
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Refresh,
        KeyCode::Char('s') | KeyCode::Char('S') => Action::StartBot,
        KeyCode::Char('x') | KeyCode::Char('X') => Action::StopBot,
        _ => Action::None,
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, state: &AppState, timeline: &mut TradeTimeline, recent: usize) {
    let area = frame.area();

    // Outer layout: header | chart | bottom
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Percentage(45),
            Constraint::Min(0),
        ])
        .split(area);

    render_header(frame, outer[0], state);
    render_chart(frame, outer[1], timeline);

    // Bottom: trades | right column
    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(outer[2]);

    // Right column: notices | logs
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(0)])
        .split(bottom[1]);

    render_trades(frame, bottom[0], state, timeline, recent);
    render_notices(frame, right[0], state);
    render_logs(frame, right[1], state);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let conn = match state.connection {
        ConnectionState::Connected => Span::styled("SSE●", Style::default().fg(Color::Green)),
        ConnectionState::Connecting => Span::styled("SSE◌", Style::default().fg(Color::Yellow)),
        ConnectionState::Backoff(_) => Span::styled("SSE○", Style::default().fg(Color::Yellow)),
        ConnectionState::Disconnected => Span::styled("SSE○", Style::default().fg(Color::Red)),
        ConnectionState::AuthRejected => Span::styled(
            "SSE✖ re-auth",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    };

    let uptime = state
        .started_at
        .map(|t| {
            let secs = (chrono::Utc::now() - t).num_seconds();
            format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
        })
        .unwrap_or_else(|| "—".into());

    let mut spans = vec![
        Span::styled(
            "  📈 Bot Deck  │ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("Up: {}  │ ", uptime)),
    ];

    match &state.status {
        Some(status) => {
            let run = if status.running {
                Span::styled(
                    "RUNNING",
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Span::styled(
                    "STOPPED",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )
            };
            spans.push(run);
            spans.push(Span::raw(format!(
                "  │ Balance: ${:.2}  │ Total: ${:.2}  │ Price: {:.2}  │ ",
                status.balance, status.total_value, status.last_price
            )));
            spans.push(Span::styled(
                format!("{}", status.market_cycle),
                Style::default().fg(Color::Magenta),
            ));
            spans.push(Span::raw("  │ "));
        }
        None => {
            spans.push(Span::styled(
                "status unavailable",
                Style::default().fg(Color::DarkGray),
            ));
            spans.push(Span::raw("  │ "));
        }
    }

    spans.push(conn);
    spans.push(Span::styled(
        "  [q] quit [r] refresh [s] start [x] stop",
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Bot Deck – {} ", state.backend_url)),
    );
    frame.render_widget(header, area);
}

// ---------------------------------------------------------------------------
// Timeline chart
// ---------------------------------------------------------------------------

fn render_chart(frame: &mut Frame, area: Rect, timeline: &mut TradeTimeline) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Trade Timeline ({} trades) ", timeline.len()));

    let Some((t0, t1)) = timeline.time_bounds() else {
        frame.render_widget(
            Paragraph::new("  waiting for trades…")
                .style(Style::default().fg(Color::DarkGray))
                .block(block),
            area,
        );
        return;
    };
    let (p_lo, p_hi) = timeline.price_bounds().unwrap_or((0.0, 1.0));

    let buys: Vec<(f64, f64)> = timeline
        .buy_series()
        .iter()
        .map(|p| (p.x as f64, p.y))
        .collect();
    let sells: Vec<(f64, f64)> = timeline
        .sell_series()
        .iter()
        .map(|p| (p.x as f64, p.y))
        .collect();

    let datasets = vec![
        Dataset::default()
            .name("buy")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Green))
            .data(&buys),
        Dataset::default()
            .name("sell")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Red))
            .data(&sells),
    ];

    // Pad degenerate ranges so a single trade still renders mid-chart.
    let (x_min, x_max) = pad_range(t0 as f64, t1 as f64, 60_000.0);
    let (y_min, y_max) = pad_range(p_lo, p_hi, 1.0);

    let x_labels = vec![
        axis_time_label(x_min),
        axis_time_label((x_min + x_max) / 2.0),
        axis_time_label(x_max),
    ];
    let y_labels = vec![
        Span::raw(format!("{:.2}", y_min)),
        Span::raw(format!("{:.2}", (y_min + y_max) / 2.0)),
        Span::raw(format!("{:.2}", y_max)),
    ];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([x_min, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(y_labels),
        );
    frame.render_widget(chart, area);
}

fn pad_range(lo: f64, hi: f64, min_span: f64) -> (f64, f64) {
    if hi - lo < min_span {
        let mid = (lo + hi) / 2.0;
        (mid - min_span / 2.0, mid + min_span / 2.0)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    }
}

fn axis_time_label(epoch_ms: f64) -> Span<'static> {
    let label = chrono::DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "—".into());
    Span::raw(label)
}

// ---------------------------------------------------------------------------
// Recent trades table
// ---------------------------------------------------------------------------

fn render_trades(
    frame: &mut Frame,
    area: Rect,
    _state: &AppState,
    timeline: &TradeTimeline,
    recent: usize,
) {
    let header_cells = ["Time", "Side", "Price", "Qty", "P&L %", "Cycle", "Reason"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = timeline
        .recent(recent)
        .into_iter()
        .map(|trade| {
            let side_color = match trade.side {
                TradeSide::BUY => Color::Green,
                TradeSide::SELL => Color::Red,
            };
            let (pnl_str, pnl_color) = match trade.profit_loss_percentage {
                Some(pnl) => (
                    format!("{:+.2}%", pnl),
                    if pnl >= 0.0 { Color::Green } else { Color::Red },
                ),
                None => ("—".into(), Color::Gray),
            };
            Row::new(vec![
                Cell::from(trade.timestamp.format("%H:%M:%S").to_string()),
                Cell::from(trade.side.as_str()).style(Style::default().fg(side_color)),
                Cell::from(format!("{:.2}", trade.price)),
                Cell::from(format!("{:.4}", trade.quantity)),
                Cell::from(pnl_str)
                    .style(Style::default().fg(pnl_color).add_modifier(Modifier::BOLD)),
                Cell::from(trade.market_cycle.clone()),
                Cell::from(trade.reason.clone()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(5),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(13),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(format!(
        " Recent Trades ({} total) ",
        timeline.len()
    )));

    frame.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Notices panel
// ---------------------------------------------------------------------------

fn render_notices(frame: &mut Frame, area: Rect, state: &AppState) {
    let items: Vec<ListItem> = state
        .notices
        .iter()
        .map(|notice| {
            let color = match notice.side {
                TradeSide::BUY => Color::Green,
                TradeSide::SELL => Color::Red,
            };
            ListItem::new(Line::from(Span::styled(
                notice.summary(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Notices "));
    frame.render_widget(list, area);
}

// ---------------------------------------------------------------------------
// Logs panel
// ---------------------------------------------------------------------------

fn render_logs(frame: &mut Frame, area: Rect, state: &AppState) {
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .take(area.height as usize)
        .map(|line| {
            let color = if line.contains("error") || line.contains("failed") {
                Color::Red
            } else if line.contains("SELL") {
                Color::Red
            } else if line.contains("BUY") || line.contains("connected") {
                Color::Green
            } else {
                Color::Gray
            };
            ListItem::new(Line::from(Span::styled(
                line.clone(),
                Style::default().fg(color),
            )))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Logs "))
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}
