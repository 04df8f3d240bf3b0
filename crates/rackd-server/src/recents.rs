//! Recently used plugins, per client host.

use parking_lot::Mutex;
use std::collections::HashMap;

pub struct RecentsRegistry {
    max: usize,
    entries: Mutex<HashMap<String, Vec<String>>>,
}

impl RecentsRegistry {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Most recent first. Empty for unknown hosts.
    pub fn list(&self, host: &str) -> Vec<String> {
        self.entries.lock().get(host).cloned().unwrap_or_default()
    }

    /// Insert `id` at the front, or move it there. The oldest entries beyond the
    /// cap are dropped.
    pub fn touch(&self, host: &str, id: &str) {
        let mut entries = self.entries.lock();
        let recents = entries.entry(host.to_string()).or_default();
        recents.retain(|r| r != id);
        recents.insert(0, id.to_string());
        recents.truncate(self.max);
    }

    pub fn clear(&self, host: &str) {
        self.entries.lock().remove(host);
    }
}
