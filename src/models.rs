/// models.rs – Core data types shared across all dashboard modules.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    BUY,
    SELL,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::BUY => "BUY",
            TradeSide::SELL => "SELL",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TradeSide::BUY),
            "SELL" => Ok(TradeSide::SELL),
            _ => Err(anyhow::anyhow!("Unknown trade side: {s}")),
        }
    }
}

/// Market cycle phase reported by the backend.
///
/// The backend contract is loose here: depending on version it sends either a
/// bare string ("MARKUP") or an object wrapping the phase name, and older
/// backends use BULL_MARKET / DECLINE / CRASH. Anything unrecognized maps to
/// `Unknown` instead of failing the whole status decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCycle {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
    #[default]
    Unknown,
}

impl MarketCycle {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "ACCUMULATION" => MarketCycle::Accumulation,
            "MARKUP" | "BULL_MARKET" => MarketCycle::Markup,
            "DISTRIBUTION" => MarketCycle::Distribution,
            "MARKDOWN" | "DECLINE" | "CRASH" => MarketCycle::Markdown,
            _ => MarketCycle::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketCycle::Accumulation => "ACCUMULATION",
            MarketCycle::Markup => "MARKUP",
            MarketCycle::Distribution => "DISTRIBUTION",
            MarketCycle::Markdown => "MARKDOWN",
            MarketCycle::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for MarketCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MarketCycle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Wrapped {
                #[serde(alias = "name")]
                phase: String,
            },
        }
        Ok(match Repr::deserialize(deserializer) {
            Ok(Repr::Name(s)) => MarketCycle::from_name(&s),
            Ok(Repr::Wrapped { phase }) => MarketCycle::from_name(&phase),
            Err(_) => MarketCycle::Unknown,
        })
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// The backend serializes timestamps as either RFC 3339 or a zone-less ISO
/// local datetime (Java `LocalDateTime` style); naive values are taken as UTC.
pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| anyhow::anyhow!("Bad timestamp '{s}': {e}"))?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

pub(crate) mod flexible_ts {
    use super::*;

    pub fn serialize<S: serde::Serializer>(
        ts: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Bot status snapshot
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of the bot. Replaced wholesale on every refresh;
/// there are no partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub running: bool,
    pub balance: f64,
    pub holdings: f64,
    pub last_price: f64,
    pub total_value: f64,
    #[serde(default)]
    pub market_cycle: MarketCycle,
    #[serde(default)]
    pub strategy_name: String,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A single executed buy/sell action. Identity is `id`: two records with the
/// same id are the same event and must collapse to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: i64,
    #[serde(with = "flexible_ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    #[serde(default)]
    pub balance_before: f64,
    #[serde(default)]
    pub balance_after: f64,
    #[serde(default)]
    pub profit_loss_percentage: Option<f64>,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub market_cycle: String,
    #[serde(default)]
    pub reason: String,
}

/// One `{x, y}` chart point: x is the trade timestamp in epoch milliseconds,
/// y is the execution price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: i64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Connection state (owned by the event stream client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Backoff(Duration),
    /// The backend refused the credential (401/403); retrying will not help
    /// until the user re-authenticates.
    AuthRejected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff(d) => write!(f, "reconnecting in {}s", d.as_secs()),
            ConnectionState::AuthRejected => write!(f, "authentication rejected – re-authenticate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transient trade notification
// ---------------------------------------------------------------------------

/// Auto-expiring user-visible notification for a newly streamed trade.
#[derive(Debug, Clone)]
pub struct TradeNotice {
    pub side: TradeSide,
    pub price: f64,
    pub profit_loss_percentage: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl TradeNotice {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            side: trade.side,
            price: trade.price,
            profit_loss_percentage: trade.profit_loss_percentage,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.created_at).num_milliseconds() >= ttl.as_millis() as i64
    }

    pub fn summary(&self) -> String {
        match self.profit_loss_percentage {
            Some(pl) => format!("{} @ {:.2} ({:+.2}%)", self.side, self.price, pl),
            None => format!("{} @ {:.2}", self.side, self.price),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared view state (for dashboard rendering)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    pub backend_url: String,
    pub started_at: Option<DateTime<Utc>>,
    pub connection: ConnectionState,
    pub status: Option<BotStatus>,
    pub notices: VecDeque<TradeNotice>,
    pub logs: VecDeque<String>,
    notice_ttl: Duration,
}

impl AppState {
    pub fn new(backend_url: String, notice_ttl: Duration) -> Self {
        Self {
            backend_url,
            started_at: None,
            connection: ConnectionState::Disconnected,
            status: None,
            notices: VecDeque::new(),
            logs: VecDeque::new(),
            notice_ttl,
        }
    }

    pub fn add_log(&mut self, msg: impl Into<String>) {
        let entry = format!("[{}] {}", Utc::now().format("%H:%M:%S"), msg.into());
        self.logs.push_front(entry);
        // Keep a reasonable history
        while self.logs.len() > 200 {
            self.logs.pop_back();
        }
    }

    pub fn push_notice(&mut self, notice: TradeNotice) {
        self.notices.push_front(notice);
        while self.notices.len() > 20 {
            self.notices.pop_back();
        }
    }

    /// Drop notices older than the configured TTL.
    pub fn prune_notices(&mut self) {
        let now = Utc::now();
        let ttl = self.notice_ttl;
        self.notices.retain(|n| !n.is_expired(now, ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_cycle_parses_string_form() {
        let cycle: MarketCycle = serde_json::from_str("\"MARKUP\"").unwrap();
        assert_eq!(cycle, MarketCycle::Markup);
    }

    #[test]
    fn market_cycle_parses_object_form() {
        let cycle: MarketCycle = serde_json::from_str(r#"{"phase": "ACCUMULATION"}"#).unwrap();
        assert_eq!(cycle, MarketCycle::Accumulation);
    }

    #[test]
    fn market_cycle_legacy_names_map_to_current_set() {
        assert_eq!(MarketCycle::from_name("BULL_MARKET"), MarketCycle::Markup);
        assert_eq!(MarketCycle::from_name("DECLINE"), MarketCycle::Markdown);
        assert_eq!(MarketCycle::from_name("CRASH"), MarketCycle::Markdown);
    }

    #[test]
    fn market_cycle_unrecognized_is_unknown() {
        let cycle: MarketCycle = serde_json::from_str("\"SIDEWAYS\"").unwrap();
        assert_eq!(cycle, MarketCycle::Unknown);
        let cycle: MarketCycle = serde_json::from_str("42").unwrap();
        assert_eq!(cycle, MarketCycle::Unknown);
    }

    #[test]
    fn timestamp_parses_rfc3339_and_naive() {
        let a = parse_timestamp("2025-01-15T10:30:00Z").unwrap();
        let b = parse_timestamp("2025-01-15T10:30:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("not a time").is_err());
    }

    #[test]
    fn trade_decodes_camel_case_wire_format() {
        let json = r#"{
            "id": 7,
            "timestamp": "2025-01-15T10:30:00",
            "type": "SELL",
            "price": 42000.5,
            "quantity": 0.01,
            "balanceBefore": 580.0,
            "balanceAfter": 1000.0,
            "profitLossPercentage": 3.2,
            "strategy": "sma-crossover",
            "marketCycle": "MARKUP",
            "reason": "crossed below SMA"
        }"#;
        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.id, 7);
        assert_eq!(trade.side, TradeSide::SELL);
        assert_eq!(trade.profit_loss_percentage, Some(3.2));
    }

    #[test]
    fn trade_tolerates_absent_optional_fields() {
        let json =
            r#"{"id":1,"timestamp":"2025-01-15T10:30:00","type":"BUY","price":1.0,"quantity":2.0}"#;
        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.profit_loss_percentage, None);
        assert!(trade.strategy.is_empty());
    }

    #[test]
    fn notice_expires_after_ttl() {
        let trade: Trade = serde_json::from_str(
            r#"{"id":1,"timestamp":"2025-01-15T10:30:00","type":"BUY","price":1.0,"quantity":2.0}"#,
        )
        .unwrap();
        let notice = TradeNotice::from_trade(&trade);
        let now = notice.created_at;
        assert!(!notice.is_expired(now, Duration::from_secs(5)));
        assert!(notice.is_expired(now + chrono::Duration::seconds(6), Duration::from_secs(5)));
    }
}
