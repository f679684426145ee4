//! # Pending Download Choices
//!
//! When a user sends a bare URL the bot replies with a "Video / Audio" keyboard. Callback
//! data is limited to 64 bytes, so the URL is parked here under a short id and the
//! buttons only carry that id.

use parking_lot::Mutex;
use rand::distr::{Alphanumeric, SampleString};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use teloxide::types::{ChatId, MessageId};

/// Length of the generated ids
pub const PENDING_ID_LEN: usize = 10;

/// A URL waiting for the user to pick video or audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub url: String,
    pub chat_id: ChatId,
    /// Message the URL came from
    pub message_id: MessageId,
}

#[derive(Debug)]
struct PendingEntry {
    download: PendingDownload,
    created: Instant,
}

/// Short-lived store of URLs awaiting a format choice
#[derive(Debug)]
pub struct PendingDownloads {
    entries: Mutex<HashMap<String, PendingEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl PendingDownloads {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Park a URL and return the id to put in the callback data
    pub fn insert(&self, download: PendingDownload) -> String {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.created) < self.ttl);

        if entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created)
                .map(|(id, _)| id.clone())
            {
                entries.remove(&oldest);
            }
        }

        let id = loop {
            let candidate = Alphanumeric.sample_string(&mut rand::rng(), PENDING_ID_LEN);
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        entries.insert(
            id.clone(),
            PendingEntry {
                download,
                created: now,
            },
        );
        id
    }

    /// Remove and return the URL stored under `id`
    ///
    /// Returns `None` when the id is unknown, expired, or belongs to another chat. A
    /// choice can only be taken once.
    pub fn take(&self, id: &str, chat_id: ChatId) -> Option<PendingDownload> {
        let mut entries = self.entries.lock();
        let entry = entries.get(id)?;

        if entry.created.elapsed() >= self.ttl {
            entries.remove(id);
            return None;
        }
        if entry.download.chat_id != chat_id {
            return None;
        }

        entries.remove(id).map(|entry| entry.download)
    }

    /// Return the URL stored under `id` without consuming the choice
    ///
    /// Same checks as [`take`](Self::take). Used when the download may still be
    /// refused and the user should be able to tap again.
    pub fn get(&self, id: &str, chat_id: ChatId) -> Option<PendingDownload> {
        let mut entries = self.entries.lock();
        let entry = entries.get(id)?;

        if entry.created.elapsed() >= self.ttl {
            entries.remove(id);
            return None;
        }
        if entry.download.chat_id != chat_id {
            return None;
        }

        Some(entry.download.clone())
    }

    /// Drop the choice stored under `id`
    pub fn remove(&self, id: &str) {
        self.entries.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingDownloads {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 10000) // 1 hour TTL, 10k max entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(chat: i64) -> PendingDownload {
        PendingDownload {
            url: "https://example.com/v/1".to_string(),
            chat_id: ChatId(chat),
            message_id: MessageId(10),
        }
    }

    #[test]
    fn test_insert_and_take_once() {
        let store = PendingDownloads::default();
        let id = store.insert(pending(5));
        assert_eq!(id.len(), PENDING_ID_LEN);

        assert_eq!(store.take(&id, ChatId(5)), Some(pending(5)));
        assert_eq!(store.take(&id, ChatId(5)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_does_not_consume() {
        let store = PendingDownloads::default();
        let id = store.insert(pending(5));

        assert_eq!(store.get(&id, ChatId(5)), Some(pending(5)));
        assert_eq!(store.get(&id, ChatId(6)), None);
        assert_eq!(store.get(&id, ChatId(5)), Some(pending(5)));

        store.remove(&id);
        assert_eq!(store.get(&id, ChatId(5)), None);
    }

    #[test]
    fn test_take_from_other_chat_is_refused() {
        let store = PendingDownloads::default();
        let id = store.insert(pending(5));

        assert_eq!(store.take(&id, ChatId(6)), None);
        // Still available to its own chat
        assert!(store.take(&id, ChatId(5)).is_some());
    }

    #[test]
    fn test_expired_entries() {
        let store = PendingDownloads::new(Duration::from_millis(50), 10);
        let id = store.insert(pending(1));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(store.take(&id, ChatId(1)), None);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = PendingDownloads::new(Duration::from_secs(60), 2);
        let first = store.insert(pending(1));
        std::thread::sleep(Duration::from_millis(5));
        store.insert(pending(2));
        store.insert(pending(3));

        assert_eq!(store.len(), 2);
        assert_eq!(store.take(&first, ChatId(1)), None);
    }
}
