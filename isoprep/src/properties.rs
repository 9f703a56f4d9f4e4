use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;

/// Format of completion timestamps written to the properties store.
pub const COMPLETION_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Shared key/value store that receives preparation completion records.
pub trait PropertiesStore: Send + Sync {
    fn put(&self, key: &str, value: String) -> anyhow::Result<()>;

    fn get(&self, key: &str) -> Option<String>;
}

/// Key under which the completion of `job_name` is recorded.
pub fn completion_key(namespace: &str, job_name: &str) -> String {
    format!("{namespace}date.{job_name}")
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(COMPLETION_TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, COMPLETION_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Process-local [`PropertiesStore`].
#[derive(Debug, Default)]
pub struct InMemoryProperties {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every entry, ordered by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl PropertiesStore for InMemoryProperties {
    fn put(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}
