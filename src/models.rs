use tracing::warn;

use crate::preferences::PreferenceStore;

/// Preference key holding the selected model identifier.
pub const PREFERRED_MODEL_KEY: &str = "mxln_preferred_model";

/// Models offered when the backend cannot list its own.
pub const FALLBACK_MODELS: [&str; 3] = ["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"];
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Result of one `load_models` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelListing {
    /// The backend listing was applied.
    Remote,
    /// The listing failed and the built-in list was installed.
    Fallback,
    /// Another load was already in flight.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelection {
    current: String,
    available: Vec<String>,
    loading: bool,
}

impl ModelSelection {
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    #[must_use]
    pub fn available(&self) -> &[String] {
        &self.available
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Marks a load as started. Returns `false` if one is already running.
    pub(crate) fn begin_load(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    pub(crate) fn end_load(&mut self) {
        self.loading = false;
    }

    /// Restores the stored model. Returns `true` when a value was found.
    pub fn restore(&mut self, preferences: &dyn PreferenceStore) -> bool {
        match preferences
            .get(PREFERRED_MODEL_KEY)
            .filter(|model| !model.trim().is_empty())
        {
            Some(model) => {
                self.current = model;
                true
            }
            None => false,
        }
    }

    /// Installs a backend listing. Returns `true` when the current model was
    /// replaced by the first listed one and should be persisted.
    pub fn apply_listing(&mut self, models: Vec<String>) -> bool {
        self.available = models;
        let Some(first) = self.available.first() else {
            return false;
        };
        if !self.current.is_empty() && self.available.contains(&self.current) {
            return false;
        }
        self.current = first.clone();
        true
    }

    /// Installs the built-in list, selecting the default only when nothing
    /// is selected yet.
    pub fn apply_fallback(&mut self) {
        self.available = FALLBACK_MODELS.iter().map(|model| model.to_string()).collect();
        if self.current.is_empty() {
            self.current = DEFAULT_MODEL.to_string();
        }
    }

    pub fn select(&mut self, model: impl Into<String>) {
        self.current = model.into();
    }
}

/// Writes the current model, logging instead of failing.
pub(crate) fn persist_model(preferences: &dyn PreferenceStore, model: &str) {
    if let Err(error) = preferences.set(PREFERRED_MODEL_KEY, model) {
        warn!(%error, model, "failed to persist model preference");
    }
}
