use isoprep::PropertiesStore;
use parking_lot::Mutex;

/// Properties store whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingProperties {
    attempts: Mutex<Vec<String>>,
}

impl FailingProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that were attempted.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

impl PropertiesStore for FailingProperties {
    fn put(&self, key: &str, _value: String) -> anyhow::Result<()> {
        self.attempts.lock().push(key.to_string());
        anyhow::bail!("properties store is read-only")
    }

    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}
