//! Observable state and user-facing notices.
//!
//! [`Observable`] holds the latest value and wakes subscribers on every
//! update. [`Notices`] fans out one-shot messages such as "out of stock".

use tokio::sync::{broadcast, watch};

/// A value that subscribers can watch for changes.
#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T> Observable<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Modify the value in place and notify subscribers.
    pub fn update<R: Default>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut result = R::default();
        self.tx.send_modify(|value| result = f(value));
        result
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// A receiver that sees the current value and every later update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Observable<T> {
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message meant for the person using the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

const NOTICE_CAPACITY: usize = 64;

/// Broadcast channel for [`Notice`]s. Sending with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { tx }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Error, message.into());
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    fn send(&self, level: NoticeLevel, message: String) {
        tracing::debug!(?level, message = %message, "notice");
        let _ = self.tx.send(Notice { level, message });
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}
