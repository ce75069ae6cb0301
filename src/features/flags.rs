// Feature flag projection
// Derives per-guild flags from the streaming config and pushes them to the flag cache

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::models::streaming::StreamingConfig;

pub const FLAG_ENABLED: &str = "musicstreaming_enabled";
pub const FLAG_GIVE_ROLE: &str = "musicstreaming_give_role";
pub const FLAG_ANNOUNCE: &str = "musicstreaming_announce";

/// Sorted so two projections of the same config compare equal
pub type FlagSet = BTreeSet<String>;

/// Shared flag cache written by every plugin
#[async_trait]
pub trait FlagCache: Send + Sync {
    /// Replace the flags a plugin owns for a guild
    async fn set_flags(&self, guild_id: u64, plugin_id: &str, flags: &FlagSet) -> anyhow::Result<()>;
}

/// Flags enabled by a config. Disabled configs produce an empty set.
pub fn derive_flags(config: &StreamingConfig) -> FlagSet {
    let mut flags = FlagSet::new();
    if !config.enabled {
        return flags;
    }
    flags.insert(FLAG_ENABLED.to_string());
    if config.give_role().is_some() {
        flags.insert(FLAG_GIVE_ROLE.to_string());
    }
    if config.announce_channel().is_some() {
        flags.insert(FLAG_ANNOUNCE.to_string());
    }
    flags
}

pub struct FeatureFlagProjector {
    cache: Arc<dyn FlagCache>,
    plugin_id: &'static str,
}

impl FeatureFlagProjector {
    pub fn new(cache: Arc<dyn FlagCache>, plugin_id: &'static str) -> Self {
        Self { cache, plugin_id }
    }

    /// Recompute and publish flags; safe to repeat
    pub async fn apply(&self, guild_id: u64, config: &StreamingConfig) -> Result<()> {
        let flags = derive_flags(config);
        debug!(guild_id, plugin = self.plugin_id, ?flags, "Updating feature flags");
        self.cache
            .set_flags(guild_id, self.plugin_id, &flags)
            .await
            .map_err(ConfigError::propagation)
    }
}

/// Process-local flag cache
#[derive(Debug, Default)]
pub struct MemoryFlagCache {
    flags: DashMap<(u64, String), FlagSet>,
}

impl MemoryFlagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_flags(&self, guild_id: u64, plugin_id: &str) -> FlagSet {
        self.flags
            .get(&(guild_id, plugin_id.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Whether any plugin has set `flag` for the guild
    pub fn has_flag(&self, guild_id: u64, flag: &str) -> bool {
        self.flags
            .iter()
            .any(|entry| entry.key().0 == guild_id && entry.value().contains(flag))
    }
}

#[async_trait]
impl FlagCache for MemoryFlagCache {
    async fn set_flags(&self, guild_id: u64, plugin_id: &str, flags: &FlagSet) -> anyhow::Result<()> {
        self.flags.insert((guild_id, plugin_id.to_string()), flags.clone());
        Ok(())
    }
}
