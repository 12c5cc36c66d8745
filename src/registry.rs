//! Alias registry: time-bounded storage of per-session forward tables.
//!
//! The registry owns every session from `set` until expiry or `delete`. The
//! in-memory implementation serializes all access through one mutex per
//! instance and expires entries with one cancelable timer task per `set`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Alias → logical route name for one session.
pub type ForwardTable = HashMap<String, String>;

/// Default validity window of a session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Errors from session registries.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The registry lock was poisoned by a panicking holder.
    #[error("session registry lock poisoned")]
    Poisoned,
    /// The backing store is unavailable.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for session forward tables keyed by token.
#[async_trait]
pub trait SessionRegistry: Send + Sync + std::fmt::Debug {
    /// Fetch the table stored under `token`; `Ok(None)` if absent or expired.
    async fn get(&self, token: &str) -> Result<Option<Arc<ForwardTable>>, RegistryError>;

    /// Store `table` under `token`, replacing any prior entry and restarting its validity window.
    async fn set(&self, token: String, table: ForwardTable) -> Result<(), RegistryError>;

    /// Remove the entry for `token`. Absent tokens are not an error.
    async fn delete(&self, token: &str) -> Result<(), RegistryError>;

    /// Drop all sessions and cancel pending expiry work.
    fn shutdown(&self) {}
}

struct SessionEntry {
    table: Arc<ForwardTable>,
    expires_at: Instant,
    generation: u64,
    timer: AbortHandle,
}

struct RegistryInner {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    generations: AtomicU64,
}

impl RegistryInner {
    fn expire(&self, token: &str, generation: u64) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(target: "veilroute::registry", session = %redact(token), "registry poisoned; expiry skipped");
                return;
            }
        };
        let current = sessions.get(token).map(|entry| entry.generation);
        if current == Some(generation) {
            sessions.remove(token);
            info!(
                target: "veilroute::registry",
                session = %redact(token),
                ttl_secs = self.ttl.as_secs_f64(),
                "session expired"
            );
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if let Ok(sessions) = self.sessions.get_mut() {
            for entry in sessions.values() {
                entry.timer.abort();
            }
        }
    }
}

/// In-memory registry guarded by a single mutex.
#[derive(Clone)]
pub struct InMemorySessionRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for InMemorySessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InMemorySessionRegistry{{ttl:{:?}}}", self.inner.ttl)
    }
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionRegistry {
    /// Registry with the default five minute validity window.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    /// Registry with a custom validity window.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                ttl,
                sessions: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Configured validity window.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Number of stored sessions, including any past their deadline but not yet swept.
    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.inner.sessions.lock().map_err(|_| RegistryError::Poisoned)?.len())
    }

    /// Whether no sessions are stored.
    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    fn schedule_expiry(&self, token: String, generation: u64, deadline: Instant) -> AbortHandle {
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&token, generation);
            }
        });
        handle.abort_handle()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn get(&self, token: &str) -> Result<Option<Arc<ForwardTable>>, RegistryError> {
        let sessions = self.inner.sessions.lock().map_err(|_| RegistryError::Poisoned)?;
        let now = Instant::now();
        Ok(sessions
            .get(token)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.table.clone()))
    }

    async fn set(&self, token: String, table: ForwardTable) -> Result<(), RegistryError> {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + self.inner.ttl;
        let mut sessions = self.inner.sessions.lock().map_err(|_| RegistryError::Poisoned)?;
        let timer = self.schedule_expiry(token.clone(), generation, expires_at);
        let aliases = table.len();
        let entry = SessionEntry { table: Arc::new(table), expires_at, generation, timer };
        if let Some(previous) = sessions.insert(token.clone(), entry) {
            previous.timer.abort();
            debug!(target: "veilroute::registry", session = %redact(&token), "session replaced");
        }
        info!(target: "veilroute::registry", session = %redact(&token), aliases, "session has been set");
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), RegistryError> {
        let mut sessions = self.inner.sessions.lock().map_err(|_| RegistryError::Poisoned)?;
        if let Some(entry) = sessions.remove(token) {
            entry.timer.abort();
            info!(target: "veilroute::registry", session = %redact(token), "session has been deleted");
        }
        Ok(())
    }

    fn shutdown(&self) {
        let Ok(mut sessions) = self.inner.sessions.lock() else {
            warn!(target: "veilroute::registry", "registry poisoned; shutdown skipped");
            return;
        };
        let dropped = sessions.len();
        for (_, entry) in sessions.drain() {
            entry.timer.abort();
        }
        info!(target: "veilroute::registry", dropped, "session registry shut down");
    }
}

/// Short, log-safe prefix of a bearer token.
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}…")
}
