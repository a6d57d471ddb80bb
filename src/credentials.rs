/// credentials.rs – Owns the backend auth token for the dashboard session.
///
/// The token is acquired out of band (login flow, .env file) and only attached
/// to outgoing requests here: HTTP calls carry it as a Bearer header, the SSE
/// connection as a `token` query parameter because the push channel cannot
/// send custom headers.
use std::sync::RwLock;

pub struct CredentialProvider {
    token: RwLock<Option<String>>,
}

impl CredentialProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    /// Read the token from the `BOT_API_TOKEN` environment variable.
    pub fn from_env() -> Self {
        Self::new(std::env::var("BOT_API_TOKEN").ok())
    }

    /// Current credential, if any. Cheap clone; callers snapshot it per
    /// request/connection rather than holding the lock.
    pub fn current(&self) -> Option<String> {
        self.token.read().expect("credential lock poisoned").clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut guard = self.token.write().expect("credential lock poisoned");
        *guard = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
    }

    pub fn clear(&self) {
        *self.token.write().expect("credential lock poisoned") = None;
    }

    pub fn is_present(&self) -> bool {
        self.current().is_some()
    }
}
