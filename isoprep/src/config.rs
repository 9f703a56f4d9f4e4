use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};
use crate::profile::ProfileRegistry;

/// Key prefix of every preparation setting.
pub const PREPARE_NAMESPACE: &str = "prepare.fastisochrone.";
/// Key consulted for the query-time disabling flag.
pub const INIT_DISABLING_ALLOWED_KEY: &str = "routing.fastisochrone.init_disabling_allowed";
/// Profile list value that clears every configured profile.
pub const PROFILES_DISABLED_SENTINEL: &str = "no";

pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_MAX_THREAD_COUNT: usize = 12;
pub const DEFAULT_MAX_CELL_NODES: usize = 5000;

/// Typed lookups over an external key/value configuration.
///
/// Implementors only provide [`ConfigSource::get`]; the typed accessors parse
/// the raw value and fall back to the default when the key is absent.
pub trait ConfigSource: Send + Sync {
    /// Raw value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_int(&self, key: &str, default: i64) -> PrepResult<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                PrepError::invalid(format!("{key} expects an integer, got '{raw}'"))
            }),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> PrepResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                PrepError::invalid(format!("{key} expects a boolean, got '{raw}'"))
            }),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// In-memory [`ConfigSource`] backed by a flat key/value map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Load a flat JSON object. Scalar values are stored in their textual form.
    ///
    /// # Errors
    ///
    /// Fails when the document is not an object or contains nested values.
    pub fn from_json(json: &str) -> PrepResult<Self> {
        let document: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|err| PrepError::invalid(format!("configuration is not a JSON object: {err}")))?;

        let mut source = Self::new();
        for (key, value) in document {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(PrepError::invalid(format!(
                        "{key} must be a scalar, got {other}"
                    )))
                }
            };
            source.values.insert(key, text);
        }
        Ok(source)
    }

    /// Collect the environment variables starting with `prefix`.
    ///
    /// `__` separates key segments and names are lower-cased, so
    /// `ISOPREP_PREPARE__FASTISOCHRONE__THREADS` with prefix `ISOPREP_`
    /// becomes `prepare.fastisochrone.threads`.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    fn from_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        vars.into_iter()
            .filter_map(|(name, value)| {
                let key = name.strip_prefix(prefix)?;
                (!key.is_empty()).then(|| (key.to_lowercase().replace("__", "."), value))
            })
            .collect()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for MapConfigSource {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut source = Self::new();
        for (key, value) in iter {
            source.insert(key, value);
        }
        source
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// How the configured profile list changes the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSelection {
    /// Keep whatever the registry already holds.
    #[default]
    Unchanged,
    /// Clear every profile.
    Disabled,
    /// Replace the profiles with these names.
    Profiles(Vec<String>),
}

impl ProfileSelection {
    /// Interpret a comma-separated profile list.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case(PROFILES_DISABLED_SENTINEL) {
            Self::Disabled
        } else if raw.trim().is_empty() {
            Self::Unchanged
        } else {
            Self::Profiles(raw.split(',').map(str::to_string).collect())
        }
    }
}

/// Settings of the preparation step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreparationConfig {
    /// Size of the preparation worker pool.
    pub threads: usize,
    /// Ceiling handed to the partitioner; not enforced by the orchestrator.
    pub max_thread_count: usize,
    /// Maximum node count of a single cell, handed to the partitioner.
    pub max_cell_nodes: usize,
    pub profiles: ProfileSelection,
    /// Only applied when the feature ends up enabled.
    pub disabling_allowed: Option<bool>,
    /// Prefix of completion record keys.
    pub namespace: String,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            max_thread_count: DEFAULT_MAX_THREAD_COUNT,
            max_cell_nodes: DEFAULT_MAX_CELL_NODES,
            profiles: ProfileSelection::Unchanged,
            disabling_allowed: None,
            namespace: PREPARE_NAMESPACE.to_string(),
        }
    }
}

impl PreparationConfig {
    /// Read the preparation settings from an external source.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidConfiguration`] for unparsable values and
    /// for a thread count that is not positive.
    pub fn from_source(source: &dyn ConfigSource) -> PrepResult<Self> {
        let defaults = Self::default();
        let threads_key = format!("{PREPARE_NAMESPACE}threads");

        let threads = positive(
            &threads_key,
            source.get_int(&threads_key, defaults.threads as i64)?,
        )?;
        let max_thread_count = positive(
            &threads_key,
            source.get_int(&threads_key, defaults.max_thread_count as i64)?,
        )?;

        let cell_key = format!("{PREPARE_NAMESPACE}maxcellnodes");
        let max_cell_nodes = positive(
            &cell_key,
            source.get_int(&cell_key, defaults.max_cell_nodes as i64)?,
        )?;

        let profiles = ProfileSelection::parse(
            &source.get_string(&format!("{PREPARE_NAMESPACE}weightings"), ""),
        );

        let disabling_allowed = match source.get(INIT_DISABLING_ALLOWED_KEY) {
            Some(_) => Some(source.get_bool(INIT_DISABLING_ALLOWED_KEY, true)?),
            None => None,
        };

        Ok(Self {
            threads,
            max_thread_count,
            max_cell_nodes,
            profiles,
            disabling_allowed,
            ..defaults
        })
    }

    /// Load a serialized configuration.
    pub fn from_json(json: &str) -> PrepResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| PrepError::invalid(format!("malformed preparation config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.threads == 0 {
            return Err(PrepError::invalid("preparation threads must be positive"));
        }
        if self.max_thread_count == 0 {
            return Err(PrepError::invalid("maximum thread count must be positive"));
        }
        if self.max_cell_nodes == 0 {
            return Err(PrepError::invalid("maximum cell node count must be positive"));
        }
        if let ProfileSelection::Profiles(names) = &self.profiles {
            if names.is_empty() {
                return Err(PrepError::invalid(
                    "an empty list of fast isochrone profiles is not allowed",
                ));
            }
        }
        Ok(())
    }

    /// Apply the profile selection and derive the feature switches.
    ///
    /// # Errors
    ///
    /// Fails when the selection holds an empty profile list.
    pub fn apply(&self, registry: &mut ProfileRegistry) -> PrepResult<()> {
        match &self.profiles {
            ProfileSelection::Unchanged => {}
            ProfileSelection::Disabled => {
                registry.clear();
            }
            ProfileSelection::Profiles(names) => {
                registry.configure_profiles(names)?;
            }
        }

        let enabled = !registry.is_empty();
        registry.set_enabled(enabled);
        if enabled {
            if let Some(allowed) = self.disabling_allowed {
                registry.set_disabling_allowed(allowed);
            }
        }

        tracing::info!(
            enabled,
            disabling_allowed = registry.is_disabling_allowed(),
            threads = self.threads,
            max_cell_nodes = self.max_cell_nodes,
            "fast isochrone preparation configured"
        );
        Ok(())
    }
}

fn positive(key: &str, value: i64) -> PrepResult<usize> {
    if value <= 0 {
        return Err(PrepError::invalid(format!(
            "{key} must be positive, got {value}"
        )));
    }
    usize::try_from(value).map_err(|_| PrepError::invalid(format!("{key} is out of range")))
}
