//! Streaming analytics over relayed messages.
//!
//! Every inbound message is counted, its size added to the byte total, and
//! its tag (the bytes before the first `||`, or the whole message) counted in
//! a table that remembers first-insertion order. Counters only ever grow.

use indexmap::IndexMap;
use relay_protocol::codec::tag_of;

/// Request, byte and per-tag counters.
#[derive(Debug, Default, Clone)]
pub struct Analytics {
    requests: u64,
    bytes: u64,
    tags: IndexMap<Vec<u8>, u64>,
}

impl Analytics {
    /// Create empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one inbound message.
    ///
    /// Never fails: a message without a delimiter counts under a tag equal to
    /// the whole message.
    pub fn record(&mut self, message: &[u8]) {
        self.requests += 1;
        self.bytes = self.bytes.saturating_add(message.len() as u64);

        let tag = tag_of(message);
        match self.tags.get_mut(tag) {
            Some(count) => *count += 1,
            None => {
                self.tags.insert(tag.to_vec(), 1);
            }
        }
    }

    /// Total messages recorded.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Total bytes recorded.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Count for one tag (0 if never seen).
    #[must_use]
    pub fn count(&self, tag: &[u8]) -> u64 {
        self.tags.get(tag).copied().unwrap_or(0)
    }

    /// Number of distinct tags seen.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Tags and counts in first-seen order.
    ///
    /// Tags are rendered as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn tags(&self) -> Vec<(String, u64)> {
        self.tags
            .iter()
            .map(|(tag, count)| (String::from_utf8_lossy(tag).into_owned(), *count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytics_counts() {
        let mut analytics = Analytics::new();
        analytics.record(b"a||1");
        analytics.record(b"a||22");
        analytics.record(b"b||333");

        assert_eq!(analytics.requests(), 3);
        assert_eq!(analytics.bytes(), 4 + 5 + 6);
        assert_eq!(analytics.count(b"a"), 2);
        assert_eq!(analytics.count(b"b"), 1);
        assert_eq!(
            analytics.tags(),
            vec![("a".to_string(), 2), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn test_untagged_message_is_its_own_tag() {
        let mut analytics = Analytics::new();
        analytics.record(b"hello");
        analytics.record(b"hello");
        analytics.record(b"");

        assert_eq!(analytics.count(b"hello"), 2);
        assert_eq!(analytics.count(b""), 1);
        assert_eq!(analytics.bytes(), 10);
    }

    #[test]
    fn test_tags_are_case_sensitive_and_ordered() {
        let mut analytics = Analytics::new();
        analytics.record(b"zeta||x");
        analytics.record(b"Chat||x");
        analytics.record(b"chat||x");
        analytics.record(b"zeta||y");

        let tags: Vec<_> = analytics.tags().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["zeta", "Chat", "chat"]);
        assert_eq!(analytics.count(b"zeta"), 2);
    }

    #[test]
    fn test_non_utf8_tags_stay_distinct() {
        let mut analytics = Analytics::new();
        analytics.record(b"\xff||x");
        analytics.record(b"\xfe||x");

        assert_eq!(analytics.tag_count(), 2);
        assert_eq!(analytics.requests(), 2);
    }
}
