// Music streaming settings model
// Matches the Firestore guild document under `musicstreaming/{guild_id}`

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Per-guild music streaming configuration
///
/// Role and channel ids are opaque: they may point at a role or channel that
/// was deleted since the config was saved. `0` means "not set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(rename = "guildId", default)]
    pub guild_id: u64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "giveRole", default)]
    pub give_role: u64,
    #[serde(rename = "announceChannel", default)]
    pub announce_channel: u64,
}

impl StreamingConfig {
    /// Defaults for a guild that never saved settings
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            enabled: false,
            give_role: 0,
            announce_channel: 0,
        }
    }

    /// Role to grant, if one is configured
    pub fn give_role(&self) -> Option<u64> {
        (self.give_role != 0).then_some(self.give_role)
    }

    /// Announcement channel, if one is configured
    pub fn announce_channel(&self) -> Option<u64> {
        (self.announce_channel != 0).then_some(self.announce_channel)
    }

    /// Shape checks required before the record can be persisted
    pub fn validate(&self) -> Result<()> {
        if self.guild_id == 0 {
            return Err(ConfigError::Validation("guild id is not set".to_string()));
        }
        Ok(())
    }

    /// Rejects a config submitted for a different guild than the one being managed
    pub fn ensure_guild(&self, guild_id: u64) -> Result<()> {
        if self.guild_id != guild_id {
            return Err(ConfigError::Validation(format!(
                "config belongs to guild {} but was submitted for guild {}",
                self.guild_id, guild_id
            )));
        }
        Ok(())
    }

    /// Firestore document id
    pub fn doc_id(&self) -> String {
        self.guild_id.to_string()
    }
}
