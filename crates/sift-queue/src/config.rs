//! Batching and dedup policy for one event stream.

use serde::{Deserialize, Serialize};

/// Policy for one [`EventBuffer`](crate::EventBuffer).
///
/// - `accept_same_event_after`: dedup window in ms; `0` disables dedup.
/// - `upload_when_more_than`: flush once the buffer holds strictly more than
///   this many events; negative disables the size trigger.
/// - `upload_when_older_than`: flush once this many ms have passed since the
///   last upload; `<= 0` disables the age trigger.
///
/// With both triggers disabled the buffer only drains through an explicit
/// flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    #[serde(alias = "acceptSameEventAfter")]
    pub accept_same_event_after: u64,

    #[serde(alias = "uploadWhenMoreThan")]
    pub upload_when_more_than: i64,

    #[serde(alias = "uploadWhenOlderThan")]
    pub upload_when_older_than: i64,
}

impl Default for QueueConfig {
    /// No dedup, flush on every append.
    fn default() -> Self {
        Self {
            accept_same_event_after: 0,
            upload_when_more_than: 0,
            upload_when_older_than: 0,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accept_same_event_after(mut self, millis: u64) -> Self {
        self.accept_same_event_after = millis;
        self
    }

    pub fn with_upload_when_more_than(mut self, count: i64) -> Self {
        self.upload_when_more_than = count;
        self
    }

    pub fn with_upload_when_older_than(mut self, millis: i64) -> Self {
        self.upload_when_older_than = millis;
        self
    }

    /// A policy that never flushes on its own.
    pub fn manual() -> Self {
        Self {
            accept_same_event_after: 0,
            upload_when_more_than: -1,
            upload_when_older_than: 0,
        }
    }

    pub fn dedup_enabled(&self) -> bool {
        self.accept_same_event_after > 0
    }

    pub fn size_trigger_enabled(&self) -> bool {
        self.upload_when_more_than >= 0
    }

    pub fn age_trigger_enabled(&self) -> bool {
        self.upload_when_older_than > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_policy_disables_triggers() {
        let config = QueueConfig::manual();
        assert!(!config.size_trigger_enabled());
        assert!(!config.age_trigger_enabled());
        assert!(!config.dedup_enabled());
    }

    #[test]
    fn test_zero_more_than_is_enabled() {
        let config = QueueConfig::new().with_upload_when_more_than(0);
        assert!(config.size_trigger_enabled());
    }

    #[test]
    fn test_legacy_names_parse() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"acceptSameEventAfter":3600000,"uploadWhenMoreThan":8,"uploadWhenOlderThan":60000}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            QueueConfig::new()
                .with_accept_same_event_after(3_600_000)
                .with_upload_when_more_than(8)
                .with_upload_when_older_than(60_000)
        );
    }
}
