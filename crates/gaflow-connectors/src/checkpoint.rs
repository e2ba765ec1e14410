//! Connector checkpoint types.
//!
//! Checkpoints capture the position of a source connector so the next run
//! can resume from where the previous one left off.

use std::collections::HashMap;

/// Checkpoint state for a source connector.
///
/// Captures the connector's position using string key-value pairs, e.g.
/// `{"start_date": "2016-07-03", "last_record_time": "2016-07-03 05:00:00 +0900"}`
/// for a report source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCheckpoint {
    /// Connector-specific offset data.
    offsets: HashMap<String, String>,
}

impl SourceCheckpoint {
    /// Creates an empty checkpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an offset value.
    pub fn set_offset(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.offsets.insert(key.into(), value.into());
    }

    /// Gets an offset value.
    #[must_use]
    pub fn get_offset(&self, key: &str) -> Option<&str> {
        self.offsets.get(key).map(String::as_str)
    }

    /// Returns all offsets.
    #[must_use]
    pub fn offsets(&self) -> &HashMap<String, String> {
        &self.offsets
    }

    /// Returns `true` if the checkpoint has any offsets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_checkpoint_basic() {
        let mut cp = SourceCheckpoint::new();
        cp.set_offset("start_date", "2016-07-03");
        cp.set_offset("end_date", "today");

        assert_eq!(cp.get_offset("start_date"), Some("2016-07-03"));
        assert_eq!(cp.get_offset("end_date"), Some("today"));
        assert_eq!(cp.get_offset("last_record_time"), None);
        assert!(!cp.is_empty());
    }

    #[test]
    fn test_offsets_overwrite() {
        let mut cp = SourceCheckpoint::new();
        cp.set_offset("last_record_time", "2016-07-03 04:00:00 +0900");
        cp.set_offset("last_record_time", "2016-07-03 05:00:00 +0900");
        assert_eq!(cp.offsets().len(), 1);
        assert_eq!(
            cp.get_offset("last_record_time"),
            Some("2016-07-03 05:00:00 +0900")
        );
    }

    #[test]
    fn test_empty_checkpoint() {
        let cp = SourceCheckpoint::new();
        assert!(cp.is_empty());
    }
}
