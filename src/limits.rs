//! # Download Limits
//!
//! Caps the number of downloads running at once, globally and per chat. yt-dlp runs
//! are heavy on CPU, disk and bandwidth, so a single chat pasting a dozen links must
//! not starve everybody else.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Why a download could not start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitRejection {
    /// The chat already has `max_per_chat` downloads running
    ChatBusy,
    /// All global download slots are taken
    GlobalBusy,
}

impl LimitRejection {
    pub fn localization_key(&self) -> &'static str {
        match self {
            LimitRejection::ChatBusy => "error-busy-user",
            LimitRejection::GlobalBusy => "error-busy-global",
        }
    }
}

/// Global and per-chat download limits
#[derive(Debug)]
pub struct DownloadLimiter {
    global: Arc<Semaphore>,
    per_chat: Arc<Mutex<HashMap<ChatId, usize>>>,
    max_per_chat: usize,
}

/// Proof that a download may run; releases both slots when dropped
#[derive(Debug)]
pub struct DownloadPermit {
    _global: OwnedSemaphorePermit,
    per_chat: Arc<Mutex<HashMap<ChatId, usize>>>,
    chat_id: ChatId,
}

impl DownloadLimiter {
    pub fn new(max_global: usize, max_per_chat: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_global)),
            per_chat: Arc::new(Mutex::new(HashMap::new())),
            max_per_chat,
        }
    }

    /// Reserve a download slot for `chat_id` without waiting
    pub fn try_acquire(&self, chat_id: ChatId) -> Result<DownloadPermit, LimitRejection> {
        let mut per_chat = self.per_chat.lock();
        let running = per_chat.get(&chat_id).copied().unwrap_or(0);
        if running >= self.max_per_chat {
            return Err(LimitRejection::ChatBusy);
        }

        let global = Arc::clone(&self.global)
            .try_acquire_owned()
            .map_err(|_| LimitRejection::GlobalBusy)?;

        per_chat.insert(chat_id, running + 1);
        Ok(DownloadPermit {
            _global: global,
            per_chat: Arc::clone(&self.per_chat),
            chat_id,
        })
    }

    /// Downloads currently running across all chats
    pub fn active_downloads(&self) -> usize {
        self.per_chat.lock().values().sum()
    }

    /// Downloads currently running for one chat
    pub fn active_for_chat(&self, chat_id: ChatId) -> usize {
        self.per_chat.lock().get(&chat_id).copied().unwrap_or(0)
    }
}

impl Drop for DownloadPermit {
    fn drop(&mut self) {
        let mut per_chat = self.per_chat.lock();
        if let Some(count) = per_chat.get_mut(&self.chat_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_chat.remove(&self.chat_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_chat_limit() {
        let limiter = DownloadLimiter::new(10, 2);
        let chat = ChatId(42);

        let first = limiter.try_acquire(chat).unwrap();
        let _second = limiter.try_acquire(chat).unwrap();
        assert_eq!(limiter.try_acquire(chat).unwrap_err(), LimitRejection::ChatBusy);

        // Other chats are unaffected
        assert!(limiter.try_acquire(ChatId(7)).is_ok());

        drop(first);
        assert!(limiter.try_acquire(chat).is_ok());
    }

    #[test]
    fn test_global_limit() {
        let limiter = DownloadLimiter::new(1, 5);
        let permit = limiter.try_acquire(ChatId(1)).unwrap();

        assert_eq!(
            limiter.try_acquire(ChatId(2)).unwrap_err(),
            LimitRejection::GlobalBusy
        );
        // A rejected global acquire must not leak a per-chat slot
        assert_eq!(limiter.active_for_chat(ChatId(2)), 0);

        drop(permit);
        assert_eq!(limiter.active_downloads(), 0);
        assert!(limiter.try_acquire(ChatId(2)).is_ok());
    }

    #[test]
    fn test_rejection_keys() {
        assert_eq!(LimitRejection::ChatBusy.localization_key(), "error-busy-user");
        assert_eq!(LimitRejection::GlobalBusy.localization_key(), "error-busy-global");
    }
}
