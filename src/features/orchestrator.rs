// Settings update flow
// save -> feature flags -> change event -> audit log

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::{ConfigError, Result};
use crate::features::audit::AuditLogger;
use crate::features::flags::FeatureFlagProjector;
use crate::features::notifier::ChangeNotifier;
use crate::models::audit::{AuditActor, AuditEntry, SETTINGS_UPDATED};
use crate::models::streaming::StreamingConfig;
use crate::store::ConfigStore;
use crate::utils::config::UPDATE_TOPIC;

pub const SAVED_ALERT: &str = "Saved settings";

/// A submitted settings form after parsing
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub guild_id: u64,
    pub config: StreamingConfig,
    /// Result of upstream form validation
    pub form_ok: bool,
    pub actor: AuditActor,
    pub deadline: Option<Duration>,
}

/// What the caller shows after an update attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateView {
    /// The submitted config, echoed back for redisplay
    pub config: StreamingConfig,
    pub saved: bool,
    pub alerts: Vec<String>,
}

pub struct UpdateOrchestrator {
    store: Arc<dyn ConfigStore>,
    flags: FeatureFlagProjector,
    notifier: ChangeNotifier,
    audit: AuditLogger,
}

impl UpdateOrchestrator {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        flags: FeatureFlagProjector,
        notifier: ChangeNotifier,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            flags,
            notifier,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Entry point for a submitted form. Rejected forms are echoed back untouched.
    pub async fn handle(&self, request: UpdateRequest) -> Result<UpdateView> {
        if !request.form_ok {
            return Ok(UpdateView {
                config: request.config,
                saved: false,
                alerts: Vec::new(),
            });
        }

        let deadline = request.deadline.map(|d| Instant::now() + d);
        self.apply_until(request.guild_id, request.config, request.actor, deadline)
            .await
    }

    /// Save and propagate without a deadline.
    ///
    /// The returned view echoes the saved config and alerts only. Rendering the
    /// status summary needs role/channel resolvers the caller owns, so it is a
    /// separate `summary::render` call on the echoed config.
    pub async fn apply(&self, guild_id: u64, config: StreamingConfig, actor: AuditActor) -> Result<UpdateView> {
        self.apply_until(guild_id, config, actor, None).await
    }

    /// Runs the update. Only validation and the save can fail the call;
    /// after the save everything is best effort.
    pub async fn apply_until(
        &self,
        guild_id: u64,
        config: StreamingConfig,
        actor: AuditActor,
        deadline: Option<Instant>,
    ) -> Result<UpdateView> {
        config.ensure_guild(guild_id)?;
        config.validate()?;

        match deadline {
            Some(at) => tokio::time::timeout_at(at, self.store.save(&config))
                .await
                .map_err(|_| ConfigError::DeadlineExceeded)??,
            None => self.store.save(&config).await?,
        }
        info!(guild_id, enabled = config.enabled, "Saved music streaming settings");

        self.propagate(guild_id, &config, deadline).await;

        self.audit
            .spawn_append(AuditEntry::new(guild_id, actor, SETTINGS_UPDATED));

        Ok(UpdateView {
            config,
            saved: true,
            alerts: vec![SAVED_ALERT.to_string()],
        })
    }

    /// Flags then change event. Failures are logged and never returned.
    async fn propagate(&self, guild_id: u64, config: &StreamingConfig, deadline: Option<Instant>) {
        match run_before(deadline, self.flags.apply(guild_id, config)).await {
            Some(Ok(())) => {}
            Some(Err(e)) => error!(guild_id, "failed updating feature flags: {}", e),
            None => {
                warn!(guild_id, "Deadline passed, skipping feature flags and change event");
                return;
            }
        }

        match run_before(deadline, self.notifier.publish(UPDATE_TOPIC, guild_id, None)).await {
            Some(Ok(())) => {}
            Some(Err(e)) => error!(guild_id, topic = UPDATE_TOPIC, "Failed sending update music streaming event: {}", e),
            None => warn!(guild_id, "Deadline passed, skipping change event"),
        }
    }
}

/// `None` when the deadline passed first
async fn run_before<F: std::future::Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::audit::{AuditSink, RetryPolicy};
    use crate::features::flags::{FlagCache, FlagSet, MemoryFlagCache, FLAG_ENABLED};
    use crate::features::notifier::{BroadcastBus, BusEvent, LocalBus};
    use crate::store::MemoryConfigStore;
    use crate::utils::config::PLUGIN_ID;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingCache {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl FlagCache for CountingCache {
        async fn set_flags(&self, _guild_id: u64, _plugin_id: &str, _flags: &FlagSet) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("flag cache unavailable");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<BusEvent>>,
    }

    #[async_trait]
    impl BroadcastBus for RecordingBus {
        async fn publish(&self, topic: &str, guild_id: u64, payload: Option<Vec<u8>>) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(BusEvent {
                topic: topic.to_string(),
                guild_id,
                payload,
            });
            Ok(())
        }
    }

    /// Flag cache that never answers
    struct StalledCache;

    #[async_trait]
    impl FlagCache for StalledCache {
        async fn set_flags(&self, _guild_id: u64, _plugin_id: &str, _flags: &FlagSet) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ConfigStore for FailingStore {
        async fn load(&self, guild_id: u64) -> Result<StreamingConfig> {
            Ok(StreamingConfig::new(guild_id))
        }

        async fn save(&self, _config: &StreamingConfig) -> Result<()> {
            Err(ConfigError::storage(anyhow::anyhow!("Firebase set error: 503")))
        }
    }

    /// Never completes a save
    struct HangingStore;

    #[async_trait]
    impl ConfigStore for HangingStore {
        async fn load(&self, guild_id: u64) -> Result<StreamingConfig> {
            Ok(StreamingConfig::new(guild_id))
        }

        async fn save(&self, _config: &StreamingConfig) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn actor() -> AuditActor {
        AuditActor {
            user_id: 7,
            username: "admin".to_string(),
        }
    }

    fn sample() -> StreamingConfig {
        StreamingConfig {
            guild_id: 123,
            enabled: true,
            give_role: 55,
            announce_channel: 77,
        }
    }

    fn orchestrator(
        store: Arc<dyn ConfigStore>,
        cache: Arc<dyn FlagCache>,
        bus: Arc<dyn BroadcastBus>,
        sink: Arc<dyn AuditSink>,
    ) -> UpdateOrchestrator {
        UpdateOrchestrator::new(
            store,
            FeatureFlagProjector::new(cache, PLUGIN_ID),
            ChangeNotifier::new(bus),
            AuditLogger::new(sink, RetryPolicy::default()),
        )
    }

    #[tokio::test]
    async fn test_apply_saves_and_propagates() {
        let store = Arc::new(MemoryConfigStore::new());
        let cache = Arc::new(MemoryFlagCache::new());
        let bus = Arc::new(RecordingBus::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(store.clone(), cache.clone(), bus.clone(), sink.clone());

        let view = orch.apply(123, sample(), actor()).await.unwrap();
        assert!(view.saved);
        assert_eq!(view.alerts, vec![SAVED_ALERT.to_string()]);

        assert_eq!(store.load(123).await.unwrap(), sample());
        assert!(cache.get_flags(123, PLUGIN_ID).contains(FLAG_ENABLED));

        let events = bus.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, UPDATE_TOPIC);
        assert_eq!(events[0].guild_id, 123);
    }

    #[tokio::test]
    async fn test_audit_entry_is_appended() {
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryFlagCache::new()),
            Arc::new(LocalBus::new(4)),
            sink.clone(),
        );

        orch.apply(123, sample(), actor()).await.unwrap();

        // The append runs on a detached task
        for _ in 0..50 {
            if !sink.entries.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].guild_id, 123);
        assert_eq!(entries[0].action, SETTINGS_UPDATED.key);
        assert_eq!(entries[0].actor, actor());
    }

    #[tokio::test]
    async fn test_guild_mismatch_writes_nothing() {
        let store = Arc::new(MemoryConfigStore::new());
        let prior = StreamingConfig { enabled: false, ..sample() };
        store.save(&prior).await.unwrap();

        let cache = Arc::new(CountingCache::default());
        let bus = Arc::new(RecordingBus::default());
        let orch = orchestrator(store.clone(), cache.clone(), bus.clone(), Arc::new(RecordingSink::default()));

        let submitted = StreamingConfig { guild_id: 999, ..sample() };
        let err = orch.apply(123, submitted, actor()).await.unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(store.load(123).await.unwrap(), prior);
        assert_eq!(store.load(999).await.unwrap(), StreamingConfig::new(999));
        assert_eq!(cache.calls.load(Ordering::SeqCst), 0);
        assert!(bus.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_skips_propagation() {
        let cache = Arc::new(CountingCache::default());
        let bus = Arc::new(RecordingBus::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(Arc::new(FailingStore), cache.clone(), bus.clone(), sink.clone());

        let err = orch.apply(123, sample(), actor()).await.unwrap_err();

        assert!(matches!(err, ConfigError::Storage(_)));
        assert_eq!(cache.calls.load(Ordering::SeqCst), 0);
        assert!(bus.events.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flag_failure_is_not_surfaced() {
        let cache = Arc::new(CountingCache { fail: true, ..Default::default() });
        let bus = Arc::new(RecordingBus::default());
        let store = Arc::new(MemoryConfigStore::new());
        let orch = orchestrator(store.clone(), cache.clone(), bus.clone(), Arc::new(RecordingSink::default()));

        let view = orch.apply(123, sample(), actor()).await.unwrap();

        assert!(view.saved);
        assert_eq!(cache.calls.load(Ordering::SeqCst), 1);
        // The change event still goes out
        assert_eq!(bus.events.lock().unwrap().len(), 1);
        assert_eq!(store.load(123).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_rejected_form_is_echoed() {
        let store = Arc::new(MemoryConfigStore::new());
        let bus = Arc::new(RecordingBus::default());
        let orch = orchestrator(store.clone(), Arc::new(MemoryFlagCache::new()), bus.clone(), Arc::new(RecordingSink::default()));

        let view = orch
            .handle(UpdateRequest {
                guild_id: 123,
                config: sample(),
                form_ok: false,
                actor: actor(),
                deadline: None,
            })
            .await
            .unwrap();

        assert_eq!(view.config, sample());
        assert!(!view.saved);
        assert!(view.alerts.is_empty());
        assert_eq!(store.load(123).await.unwrap(), StreamingConfig::new(123));
        assert!(bus.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_aborts_before_save() {
        let cache = Arc::new(CountingCache::default());
        let bus = Arc::new(RecordingBus::default());
        let orch = orchestrator(Arc::new(HangingStore), cache.clone(), bus.clone(), Arc::new(RecordingSink::default()));

        let err = orch
            .handle(UpdateRequest {
                guild_id: 123,
                config: sample(),
                form_ok: true,
                actor: actor(),
                deadline: Some(Duration::from_millis(20)),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::DeadlineExceeded));
        assert_eq!(cache.calls.load(Ordering::SeqCst), 0);
        assert!(bus.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_after_save_still_succeeds() {
        let store = Arc::new(MemoryConfigStore::new());
        let bus = Arc::new(RecordingBus::default());
        let orch = orchestrator(store.clone(), Arc::new(StalledCache), bus.clone(), Arc::new(RecordingSink::default()));

        let view = orch
            .handle(UpdateRequest {
                guild_id: 123,
                config: sample(),
                form_ok: true,
                actor: actor(),
                deadline: Some(Duration::from_millis(30)),
            })
            .await
            .unwrap();

        // The save is durable, only propagation was cut short
        assert!(view.saved);
        assert_eq!(view.alerts, vec![SAVED_ALERT.to_string()]);
        assert_eq!(store.load(123).await.unwrap(), sample());
        assert!(bus.events.lock().unwrap().is_empty());
    }
}
