//! # Request Deduplication Module
//!
//! Telegram redelivers webhook updates that were not acknowledged in time, and polling
//! can hand out the same update again after a restart. This module makes sure a single
//! message starts at most one download.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::types::{ChatId, MessageId};

use crate::downloader::MediaKind;

/// Represents a unique download request
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RequestId {
    /// Telegram chat ID
    pub chat_id: ChatId,
    /// Message carrying the URL
    pub message_id: MessageId,
    /// Requested media kind; asking for video and then audio of the same message is
    /// two requests
    pub kind: MediaKind,
}

impl RequestId {
    pub fn new(chat_id: ChatId, message_id: MessageId, kind: MediaKind) -> Self {
        Self {
            chat_id,
            message_id,
            kind,
        }
    }
}

#[derive(Debug, Clone)]
struct RequestEntry {
    first_seen: Instant,
    count: u32,
}

/// In-memory request deduplication store
#[derive(Debug)]
pub struct RequestDeduplicator {
    requests: Mutex<HashMap<RequestId, RequestEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl RequestDeduplicator {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
        }
    }

    /// Check if a request is a duplicate
    ///
    /// Returns true if this request was already seen within the TTL and should be
    /// ignored, false if it is new (and records it).
    pub fn is_duplicate(&self, request_id: &RequestId) -> bool {
        let mut requests = self.requests.lock();
        let now = Instant::now();

        requests.retain(|_, entry| now.duration_since(entry.first_seen) < self.ttl);

        if let Some(entry) = requests.get_mut(request_id) {
            entry.count += 1;
            return true;
        }

        if requests.len() >= self.max_entries {
            if let Some(oldest_key) = requests
                .iter()
                .min_by_key(|(_, entry)| entry.first_seen)
                .map(|(key, _)| *key)
            {
                requests.remove(&oldest_key);
            }
        }

        requests.insert(
            *request_id,
            RequestEntry {
                first_seen: now,
                count: 1,
            },
        );
        false
    }

    /// Forget a request so that it can be submitted again
    ///
    /// Used when a request was refused before any work started (e.g. the user already
    /// has too many downloads running).
    pub fn forget(&self, request_id: &RequestId) {
        self.requests.lock().remove(request_id);
    }

    pub fn stats(&self) -> DeduplicationStats {
        let requests = self.requests.lock();
        let now = Instant::now();
        let total_entries = requests.len();
        let expired_entries = requests
            .values()
            .filter(|entry| now.duration_since(entry.first_seen) >= self.ttl)
            .count();

        DeduplicationStats {
            total_entries,
            active_entries: total_entries.saturating_sub(expired_entries),
            total_duplicates: requests.values().map(|e| e.count.saturating_sub(1)).sum(),
            max_entries: self.max_entries,
            ttl: self.ttl,
        }
    }
}

/// Statistics about the deduplication store
#[derive(Debug, Clone)]
pub struct DeduplicationStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub total_duplicates: u32,
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for RequestDeduplicator {
    fn default() -> Self {
        Self::new(300, 10000) // 5 minutes TTL, 10k max entries
    }
}

pub type SharedDeduplicator = Arc<RequestDeduplicator>;

pub fn create_shared_deduplicator(ttl_secs: u64, max_entries: usize) -> SharedDeduplicator {
    Arc::new(RequestDeduplicator::new(ttl_secs, max_entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn request(chat: i64, message: i32, kind: MediaKind) -> RequestId {
        RequestId::new(ChatId(chat), MessageId(message), kind)
    }

    #[test]
    fn test_deduplication_basic() {
        let deduplicator = RequestDeduplicator::new(60, 100);
        let request_id = request(123, 456, MediaKind::Video);

        assert!(!deduplicator.is_duplicate(&request_id));
        assert!(deduplicator.is_duplicate(&request_id));

        // Different message or different kind is a new request
        assert!(!deduplicator.is_duplicate(&request(123, 457, MediaKind::Video)));
        assert!(!deduplicator.is_duplicate(&request(123, 456, MediaKind::Audio)));
    }

    #[test]
    fn test_deduplication_expiration() {
        let deduplicator = RequestDeduplicator::new(1, 100);
        let request_id = request(123, 456, MediaKind::Video);

        assert!(!deduplicator.is_duplicate(&request_id));
        thread::sleep(Duration::from_millis(1100));
        assert!(!deduplicator.is_duplicate(&request_id));
    }

    #[test]
    fn test_max_entries_limit() {
        let deduplicator = RequestDeduplicator::new(300, 3);

        for i in 0..3 {
            assert!(!deduplicator.is_duplicate(&request(i, i as i32, MediaKind::Video)));
        }
        assert!(!deduplicator.is_duplicate(&request(999, 999, MediaKind::Video)));

        assert!(deduplicator.stats().total_entries <= 3);
    }

    #[test]
    fn test_forget_allows_resubmission() {
        let deduplicator = create_shared_deduplicator(300, 100);
        let request_id = request(1, 1, MediaKind::Audio);

        assert!(!deduplicator.is_duplicate(&request_id));
        deduplicator.forget(&request_id);
        assert!(!deduplicator.is_duplicate(&request_id));
    }

    #[test]
    fn test_statistics() {
        let deduplicator = RequestDeduplicator::new(300, 100);
        let request_id = request(123, 456, MediaKind::Video);

        assert_eq!(deduplicator.stats().total_entries, 0);

        deduplicator.is_duplicate(&request_id);
        deduplicator.is_duplicate(&request_id);

        let stats = deduplicator.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.active_entries, 1);
        assert_eq!(stats.total_duplicates, 1);
    }
}
