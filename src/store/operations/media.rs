use serde::{Deserialize, Serialize};

use crate::spam::SpamConfig;
use crate::store::{Store, StoreError};

const MEDIA_SETTINGS_KEY: &str = "eyes-closed-punisher-media";

/// Media selection and spam config as last set through the control API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSettings {
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub video_files: Vec<String>,
    pub spam_config: SpamConfig,
}

impl Store {
    pub fn load_media_settings(&self) -> Result<Option<MediaSettings>, StoreError> {
        match self.settings.get(MEDIA_SETTINGS_KEY.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_media_settings(&self, settings: &MediaSettings) -> Result<(), StoreError> {
        settings
            .spam_config
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        self.settings
            .insert(MEDIA_SETTINGS_KEY.as_bytes(), Self::serialize(settings)?)?;
        Ok(())
    }
}
