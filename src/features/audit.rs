// Control panel audit log
// Best effort: entries are retried a bounded number of times, then dropped

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::firebase::FirebaseClient;
use crate::models::audit::AuditEntry;

/// Append-only audit destination
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}

/// Capped exponential backoff with jitter.
///
/// The delay after the n-th failed attempt is `min(base * 2^(n-1), max)` plus a
/// uniform jitter of up to half that delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt, without jitter
    pub fn delay(&self, failures: u32) -> Duration {
        let d = self.base_delay * 2u32.saturating_pow(failures.saturating_sub(1));
        d.min(self.max_delay)
    }

    fn jittered_delay(&self, failures: u32) -> Duration {
        let delay = self.delay(failures);
        let spread = delay / 2;
        if spread.is_zero() {
            return delay;
        }
        delay + rand::rng().random_range(Duration::ZERO..=spread)
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    policy: RetryPolicy,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Append with retries. Returns the last error once the budget is spent.
    pub async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let mut failures = 0;
        loop {
            match self.sink.append(entry).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        return Err(e.context(format!("audit append gave up after {} attempts", failures)));
                    }
                    let backoff = self.policy.jittered_delay(failures);
                    debug!(
                        error = %e, attempt = failures,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Audit append failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Fire and forget: runs `append` on a detached task and drops the entry on failure
    pub fn spawn_append(&self, entry: AuditEntry) -> JoinHandle<()> {
        let logger = self.clone();
        tokio::spawn(async move {
            if let Err(e) = logger.append(&entry).await {
                warn!(guild_id = entry.guild_id, action = %entry.action, "Dropping audit entry: {:#}", e);
            }
        })
    }
}

/// Writes entries to `guilds/{guild_id}/audit_log`
pub struct FirestoreAuditSink {
    firebase: Arc<FirebaseClient>,
}

impl FirestoreAuditSink {
    pub fn new(firebase: Arc<FirebaseClient>) -> Self {
        Self { firebase }
    }
}

#[async_trait]
impl AuditSink for FirestoreAuditSink {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let value = serde_json::to_value(entry)?;
        self.firebase
            .add_to_subcollection("guilds", &entry.guild_id.to_string(), "audit_log", &value)
            .await?;
        Ok(())
    }
}

/// Audit sink that only emits a log line, for runs without Firestore
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        info!(
            guild_id = entry.guild_id,
            user_id = entry.actor.user_id,
            action = %entry.action,
            "{} ({})", entry.message, entry.actor.username
        );
        Ok(())
    }
}
