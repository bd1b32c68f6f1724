use std::sync::Arc;

use storage::repository::PreferenceRepository;
use study_core::model::{PreferenceKey, Preferences};

use crate::error::PreferenceServiceError;

/// Typed access to persisted one-time UI flags.
#[derive(Clone)]
pub struct PreferenceService {
    repo: Arc<dyn PreferenceRepository>,
}

impl PreferenceService {
    #[must_use]
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }

    /// Load every stored flag, defaulting the rest.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceServiceError` on storage failures or unparsable values.
    pub async fn load(&self) -> Result<Preferences, PreferenceServiceError> {
        let mut preferences = Preferences::default();
        for (key, raw) in self.repo.list_preferences().await? {
            preferences.set(key, key.parse_value(&raw)?);
        }
        Ok(preferences)
    }

    /// Read one flag, falling back to its default when unset.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceServiceError` on storage failures or unparsable values.
    pub async fn get(&self, key: PreferenceKey) -> Result<bool, PreferenceServiceError> {
        match self.repo.get_preference(key).await? {
            Some(raw) => Ok(key.parse_value(&raw)?),
            None => Ok(key.default_value()),
        }
    }

    /// Persist one flag.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceServiceError` on storage failures.
    pub async fn set(&self, key: PreferenceKey, value: bool) -> Result<(), PreferenceServiceError> {
        self.repo.set_preference(key, &value.to_string()).await?;
        Ok(())
    }
}
