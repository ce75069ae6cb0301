// Audit log model
// Stored under `guilds/{guild_id}/audit_log`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered audit action: stable key plus the message shown in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionFormat {
    pub key: &'static str,
    pub format: &'static str,
}

pub const SETTINGS_UPDATED: ActionFormat = ActionFormat {
    key: "musicstreaming_settings_updated",
    format: "Updated music streaming settings",
};

/// Who performed the change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub username: String,
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "guildId")]
    pub guild_id: u64,
    pub actor: AuditActor,
    pub action: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(guild_id: u64, actor: AuditActor, action: ActionFormat) -> Self {
        Self {
            guild_id,
            actor,
            action: action.key.to_string(),
            message: action.format.to_string(),
            timestamp: Utc::now(),
        }
    }
}
