use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};

/// Normalize a profile name the way every registry operation compares them.
pub fn normalize_profile(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Configured fast-isochrone profiles plus the feature switches derived from them.
///
/// Profile names are stored normalized (trimmed, lower-cased) and deduplicated.
/// Iteration follows first insertion, which is kept for display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRegistry {
    profiles: Vec<String>,
    enabled: bool,
    disabling_allowed: bool,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            enabled: false,
            disabling_allowed: true,
        }
    }
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configured profiles.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidConfiguration`] when `names` is empty. The
    /// registry is left untouched.
    pub fn configure_profiles<I, S>(&mut self, names: I) -> PrepResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for name in names {
            let name = normalize_profile(name.as_ref());
            if !normalized.contains(&name) {
                normalized.push(name);
            }
        }

        if normalized.is_empty() {
            return Err(PrepError::invalid(
                "an empty list of fast isochrone profiles is not allowed",
            ));
        }

        tracing::debug!(profiles = ?normalized, "configured fast isochrone profiles");
        self.profiles = normalized;
        self.enabled = true;
        Ok(self)
    }

    /// Add a single profile. Adding a name that is already present is a no-op.
    pub fn add_profile(&mut self, name: &str) -> &mut Self {
        let name = normalize_profile(name);
        if !self.profiles.contains(&name) {
            self.profiles.push(name);
            self.enabled = true;
        }
        self
    }

    /// Drop every configured profile and disable the feature.
    pub fn clear(&mut self) -> &mut Self {
        self.profiles.clear();
        self.enabled = false;
        self
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = normalize_profile(name);
        self.profiles.iter().any(|p| *p == name)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Explicitly enable or disable fast-isochrone preparation.
    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    /// Whether the feature may be switched off at query time.
    ///
    /// Always true while the feature is disabled.
    pub fn is_disabling_allowed(&self) -> bool {
        self.disabling_allowed || !self.is_enabled()
    }

    pub fn set_disabling_allowed(&mut self, allowed: bool) -> &mut Self {
        self.disabling_allowed = allowed;
        self
    }
}
