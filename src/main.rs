/// main.rs – Entry point for the Bot Deck dashboard.
///
/// Orchestrates startup, the backend status cache, the reconnecting trade
/// event stream, the timeline reducer, and the live ratatui dashboard.
mod api;
mod config;
mod credentials;
mod dashboard;
mod error;
mod models;
mod status;
mod stream;
mod timeline;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use crossterm::event::EventStream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api::BotApiClient;
use config::Settings;
use credentials::CredentialProvider;
use dashboard::Action;
use models::{AppState, TradeNotice};
use status::StatusCache;
use stream::EventStreamClient;
use timeline::TradeTimeline;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "botdeck",
    about = "Live terminal dashboard for the trading bot backend – status, trades, and a real-time timeline",
    version
)]
struct Cli {
    /// Backend base URL; overrides config and BOT_BACKEND_URL.
    #[arg(long)]
    backend_url: Option<String>,

    /// Disable the interactive dashboard and print logs to stdout instead.
    #[arg(long, default_value_t = false)]
    no_dashboard: bool,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load settings (YAML + env override)
    let settings = Settings::load(&cli.config, cli.backend_url.clone())?;

    // Logging – respects LOG_LEVEL env var; falls back to config
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.bot.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let creds = Arc::new(match settings.api_token.clone() {
        Some(token) => CredentialProvider::new(Some(token)),
        None => CredentialProvider::from_env(),
    });
    if !creds.is_present() {
        warn!("⚠️  No API token found – requests will be unauthenticated.");
    }

    let api = Arc::new(BotApiClient::new(
        &settings.backend.base_url,
        Duration::from_secs_f64(settings.backend.request_timeout_seconds),
        Arc::clone(&creds),
    )?);
    info!("Backend: {}", api.base_url());

    // Session-local state. Everything below is owned by the main loop, so no
    // locks are needed: every mutation happens between select arms.
    let cache = StatusCache::new(Arc::clone(&api));
    let mut timeline = TradeTimeline::new();
    let mut app = AppState::new(
        api.base_url().to_string(),
        Duration::from_secs_f64(settings.dashboard.notice_ttl_seconds),
    );
    app.started_at = Some(Utc::now());

    // Seed status and trade history before opening the live stream, so the
    // first frame has data and the stream only has to deliver deltas.
    match cache.refresh().await {
        Ok(status) => {
            app.status = Some(status);
            app.add_log("Status loaded".to_string());
        }
        Err(e) => {
            app.add_log(format!("Initial status fetch failed: {e}"));
            warn!("Initial status fetch failed: {e}");
        }
    }
    match api.fetch_trade_history().await {
        Ok(history) => {
            let added = timeline.set_history(history);
            app.add_log(format!("Loaded {added} historical trade(s)"));
            info!("Loaded {added} historical trade(s)");
        }
        Err(e) => {
            app.add_log(format!("Trade history fetch failed: {e}"));
            warn!("Trade history fetch failed: {e}");
        }
    }

    // Live trade stream
    let mut feed = EventStreamClient::new(
        api.base_url(),
        Arc::clone(&creds),
        Duration::from_secs_f64(settings.stream.reconnect_delay_seconds),
        settings.stream.warn_after_failures,
        settings.stream.channel_capacity,
    )?;
    let mut trade_rx = feed.subscribe();
    let mut conn_rx = feed.state();
    let mut status_rx = cache.observe();
    feed.connect();

    // Tickers
    let refresh_ms = config::interval_millis(settings.dashboard.refresh_rate);
    let mut dash_ticker = tokio::time::interval(Duration::from_millis(refresh_ms));
    let status_ms = config::interval_millis(settings.status.refresh_interval_seconds);
    let mut status_ticker = tokio::time::interval(Duration::from_millis(status_ms));
    status_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Dashboard setup (unless --no-dashboard)
    let mut terminal = if !cli.no_dashboard {
        Some(dashboard::setup_terminal()?)
    } else {
        None
    };
    let mut event_stream = EventStream::new();
    let recent = settings.dashboard.recent_trades;

    info!("Dashboard started.  Press 'q' to quit.");

    // -----------------------------------------------------------------------
    // Main event loop
    // -----------------------------------------------------------------------
    loop {
        if let Some(ref mut term) = terminal {
            term.draw(|f| dashboard::render(f, &app, &mut timeline, recent))?;
        }

        tokio::select! {
            // ── Dashboard keyboard events ──────────────────────────────────
            Some(Ok(event)) = event_stream.next() => {
                match dashboard::handle_event(&event) {
                    Action::Quit => break,
                    Action::Refresh => {
                        app.add_log("Manual refresh".to_string());
                        refresh_status(&cache, &mut app).await;
                    }
                    Action::StartBot => {
                        match api.start_bot().await {
                            Ok(()) => app.add_log("Bot start requested".to_string()),
                            Err(e) => app.add_log(format!("Bot start failed: {e}")),
                        }
                        refresh_status(&cache, &mut app).await;
                    }
                    Action::StopBot => {
                        match api.stop_bot().await {
                            Ok(()) => app.add_log("Bot stop requested".to_string()),
                            Err(e) => app.add_log(format!("Bot stop failed: {e}")),
                        }
                        refresh_status(&cache, &mut app).await;
                    }
                    Action::None => {}
                }
            }

            // ── Dashboard refresh tick ─────────────────────────────────────
            _ = dash_ticker.tick() => {
                app.prune_notices();
            }

            // ── Periodic status refresh ────────────────────────────────────
            _ = status_ticker.tick() => {
                refresh_status(&cache, &mut app).await;
            }

            // ── Live trade events ──────────────────────────────────────────
            result = trade_rx.recv() => {
                match result {
                    Ok(trade) => {
                        let notice = TradeNotice::from_trade(&trade);
                        if timeline.apply(trade) {
                            app.add_log(notice.summary());
                            app.push_notice(notice);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Trade feed lagged – {missed} event(s) dropped");
                        app.add_log(format!("Feed lagged: {missed} event(s) dropped"));
                    }
                    Err(RecvError::Closed) => {
                        error!("Trade feed channel closed");
                        break;
                    }
                }
            }

            // ── Connection state changes ───────────────────────────────────
            Ok(()) = conn_rx.changed() => {
                let state = *conn_rx.borrow_and_update();
                app.add_log(format!("Stream: {state}"));
                app.connection = state;
            }

            // ── Status cache updates ───────────────────────────────────────
            Ok(()) = status_rx.changed() => {
                app.status = status_rx.borrow_and_update().clone();
            }

            // ── Ctrl-C outside the TUI (e.g. --no-dashboard) ───────────────
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Graceful shutdown
    // -----------------------------------------------------------------------
    feed.disconnect().await;
    if let Some(ref mut term) = terminal {
        dashboard::teardown_terminal(term)?;
    }

    info!(
        "Session ended – {} trade(s) on the timeline, {} connection attempt(s)",
        timeline.len(),
        feed.connection_attempts(),
    );

    Ok(())
}

/// Refresh the status cache, logging failures into the dashboard. On error
/// the previously cached status stays on screen.
async fn refresh_status(cache: &StatusCache, app: &mut AppState) {
    match cache.refresh().await {
        Ok(_) => {}
        Err(e) if e.is_auth() => {
            error!("Status refresh rejected: {e} – re-authenticate");
            app.add_log(format!("Status refresh rejected: {e}"));
        }
        Err(e) => {
            warn!("Status refresh failed: {e} – keeping last known status");
            app.add_log(format!("Status refresh failed: {e}"));
        }
    }
}
