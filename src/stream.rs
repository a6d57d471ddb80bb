/// stream.rs – Reconnecting SSE client for the backend trade feed.
///
/// Maintains one logical subscription to `GET /api/trades/events` and fans
/// decoded `Trade` events out to any number of consumers, surviving
/// connection churn underneath:
///
///   Disconnected → Connecting → Connected
///   Connected | Connecting → Backoff(delay) → Connecting   (on any drop)
///   Connecting → AuthRejected → Connecting                 (on 401/403)
///
/// The credential is read at each (re)connect and attached as a `token`
/// query parameter – the push channel cannot carry custom headers. A
/// malformed `trade` payload is logged and dropped without closing the
/// stream. There is no replay: consumers that attach late miss prior events;
/// history comes from the bulk fetch that seeds the timeline.
use futures_util::StreamExt;
use reqwest::{header, Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::credentials::CredentialProvider;
use crate::error::ApiError;
use crate::models::{ConnectionState, Trade};

pub struct EventStreamClient {
    worker: WorkerCtx,
    task: Option<JoinHandle<()>>,
}

/// Everything the background worker needs, shared with the client handle so
/// state and counters stay observable from outside.
#[derive(Clone)]
struct WorkerCtx {
    events_url: String,
    creds: Arc<CredentialProvider>,
    reconnect_delay: Duration,
    warn_after_failures: u32,
    http: Client,
    state: Arc<watch::Sender<ConnectionState>>,
    trades: broadcast::Sender<Trade>,
    /// Total connection attempts since construction.
    attempts: Arc<AtomicU64>,
    /// Currently open transport connections; must never exceed 1.
    live: Arc<AtomicU64>,
}

impl EventStreamClient {
    pub fn new(
        base_url: &str,
        creds: Arc<CredentialProvider>,
        reconnect_delay: Duration,
        warn_after_failures: u32,
        channel_capacity: usize,
    ) -> anyhow::Result<Self> {
        // No total timeout here – the stream stays open indefinitely.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (trades, _) = broadcast::channel(channel_capacity);
        Ok(Self {
            worker: WorkerCtx {
                events_url: format!("{}/api/trades/events", base_url.trim_end_matches('/')),
                creds,
                reconnect_delay,
                warn_after_failures,
                http,
                state: Arc::new(state),
                trades,
                attempts: Arc::new(AtomicU64::new(0)),
                live: Arc::new(AtomicU64::new(0)),
            },
            task: None,
        })
    }

    /// Receiver of decoded trade events, in transport arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<Trade> {
        self.worker.trades.subscribe()
    }

    /// Live view of the connection state machine.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.worker.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.worker.state.borrow()
    }

    pub fn connection_attempts(&self) -> u64 {
        self.worker.attempts.load(Ordering::SeqCst)
    }

    pub fn live_connections(&self) -> u64 {
        self.worker.live.load(Ordering::SeqCst)
    }

    /// Start the subscription worker. Idempotent: calling while a worker is
    /// already live is a no-op and never opens a second connection.
    pub fn connect(&mut self) {
        if let Some(task) = &self.task {
            if !task.is_finished() {
                debug!("Event stream already connected – ignoring connect()");
                return;
            }
        }
        let ctx = self.worker.clone();
        self.task = Some(tokio::spawn(run_worker(ctx)));
    }

    /// Force `Disconnected`, aborting the worker and cancelling any pending
    /// backoff sleep. Waits for the worker to actually stop before publishing
    /// `Disconnected`, so a mid-poll worker cannot overwrite the state
    /// afterwards. `connect()` may be called again for a clean restart.
    pub async fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("Event stream disconnected");
        }
        self.worker
            .state
            .send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

async fn run_worker(ctx: WorkerCtx) {
    let mut failures: u32 = 0;
    loop {
        ctx.state.send_replace(ConnectionState::Connecting);
        ctx.attempts.fetch_add(1, Ordering::SeqCst);

        let next = match run_stream(&ctx).await {
            Ok(()) => {
                // Server closed the stream; treat like a drop and reconnect.
                info!("Trade event stream closed by server – will reconnect");
                failures = 0;
                ConnectionState::Backoff(ctx.reconnect_delay)
            }
            Err(e) if e.is_auth() => {
                failures += 1;
                error!("Trade event stream rejected: {e} – re-authenticate");
                // Distinct state, held through the delay, so the view layer
                // can tell the user to re-authenticate.
                ConnectionState::AuthRejected
            }
            Err(e) => {
                failures += 1;
                if failures >= ctx.warn_after_failures {
                    warn!("Trade event stream failing ({failures} consecutive attempts): {e}");
                } else {
                    debug!("Trade event stream error: {e}");
                }
                ConnectionState::Backoff(ctx.reconnect_delay)
            }
        };

        ctx.state.send_replace(next);
        tokio::time::sleep(ctx.reconnect_delay).await;
    }
}

/// One connection lifetime: connect, stream, decode, fan out. Returns `Ok`
/// on orderly end-of-stream and `Err` on transport/auth failures.
async fn run_stream(ctx: &WorkerCtx) -> Result<(), ApiError> {
    let url = events_url(&ctx.events_url, ctx.creds.current().as_deref())
        .map_err(|e| ApiError::Transport(format!("bad events URL: {e}")))?;

    let resp = ctx
        .http
        .get(url)
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::from_status(status));
    }

    let _guard = LiveGuard::acquire(&ctx.live);
    ctx.state.send_replace(ConnectionState::Connected);
    info!("Trade event stream connected");

    let mut parser = SseParser::default();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ApiError::Transport(e.to_string()))?;
        for event in parser.push(&chunk) {
            if event.name != "trade" {
                continue;
            }
            match serde_json::from_str::<Trade>(&event.data) {
                Ok(trade) => {
                    debug!("Trade event: id={} {} @ {}", trade.id, trade.side, trade.price);
                    // Ignore send errors (no subscribers)
                    let _ = ctx.trades.send(trade);
                }
                Err(e) => {
                    // One bad message must not kill the stream.
                    warn!("Dropping malformed trade event: {e}");
                }
            }
        }
    }
    Ok(())
}

fn events_url(base: &str, token: Option<&str>) -> anyhow::Result<Url> {
    let mut url = Url::parse(base)?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Guards the at-most-one-open-connection invariant: increments the gauge on
/// connection establishment and decrements on any exit path, including task
/// abort (Drop runs at the await point).
struct LiveGuard {
    gauge: Arc<AtomicU64>,
}

impl LiveGuard {
    fn acquire(gauge: &Arc<AtomicU64>) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self {
            gauge: Arc::clone(gauge),
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// SSE wire parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental server-sent-events parser. Feed it raw byte chunks, get
/// complete events back. Buffering is byte-oriented and only complete lines
/// are decoded as UTF-8, so a multi-byte character split across transport
/// chunks survives intact (continuation bytes can never equal `\n`).
/// Partial lines carry over between chunks; `:` comment lines and
/// `id:`/`retry:` fields are ignored.
#[derive(Default)]
pub(crate) struct SseParser {
    buf: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    let name = if self.event.is_empty() {
                        "message".to_string()
                    } else {
                        std::mem::take(&mut self.event)
                    };
                    out.push(SseEvent {
                        name,
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                }
                self.event.clear();
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = value.to_string(),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        out
    }
}
