/// status.rs – Shared cache of the latest known BotStatus.
///
/// One instance per dashboard session, explicitly constructed and injected
/// (no process-wide singleton). Fan-out uses a `tokio::sync::watch` channel:
/// every observer immediately sees the current value and every subsequent
/// replacement. The cache has no cadence of its own; callers decide when to
/// refresh (manual key, interval timer in the main loop).
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::api::BotApiClient;
use crate::error::ApiError;
use crate::models::BotStatus;

pub struct StatusCache {
    api: Arc<BotApiClient>,
    tx: watch::Sender<Option<BotStatus>>,
}

impl StatusCache {
    pub fn new(api: Arc<BotApiClient>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { api, tx }
    }

    /// Fetch a fresh status. On success the cached value is replaced and all
    /// observers are notified; on failure the cache is left untouched and the
    /// error goes to this caller only – observers keep the last good value.
    pub async fn refresh(&self) -> Result<BotStatus, ApiError> {
        let status = self.api.fetch_status().await?;
        debug!(
            "Status refreshed: running={} balance={:.2} last_price={:.2}",
            status.running, status.balance, status.last_price
        );
        self.tx.send_replace(Some(status.clone()));
        Ok(status)
    }

    /// Live view of the cache: yields the current value right away (None if
    /// never populated) and each replacement after that. Receivers observe
    /// channel closure when the session tears the cache down.
    pub fn observe(&self) -> watch::Receiver<Option<BotStatus>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<BotStatus> {
        self.tx.borrow().clone()
    }
}
