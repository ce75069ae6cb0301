// Firestore-backed config store
// Documents live at `musicstreaming/{guild_id}`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::ConfigStore;
use crate::api::firebase::FirebaseClient;
use crate::error::{ConfigError, Result};
use crate::models::streaming::StreamingConfig;

pub const COLLECTION: &str = "musicstreaming";

pub struct FirestoreConfigStore {
    firebase: Arc<FirebaseClient>,
}

impl FirestoreConfigStore {
    pub fn new(firebase: Arc<FirebaseClient>) -> Self {
        Self { firebase }
    }
}

#[async_trait]
impl ConfigStore for FirestoreConfigStore {
    async fn load(&self, guild_id: u64) -> Result<StreamingConfig> {
        let doc = self
            .firebase
            .get_document(COLLECTION, &guild_id.to_string())
            .await
            .map_err(ConfigError::storage)?;

        let Some(doc) = doc else {
            debug!(guild_id, "No music streaming config stored, using defaults");
            return Ok(StreamingConfig::new(guild_id));
        };

        let mut config: StreamingConfig = serde_json::from_value(doc).map_err(ConfigError::storage)?;
        // The document key is authoritative
        config.guild_id = guild_id;
        Ok(config)
    }

    async fn save(&self, config: &StreamingConfig) -> Result<()> {
        config.validate()?;
        let value = serde_json::to_value(config).map_err(ConfigError::storage)?;
        self.firebase
            .set_document(COLLECTION, &config.doc_id(), &value)
            .await
            .map_err(ConfigError::storage)
    }
}
