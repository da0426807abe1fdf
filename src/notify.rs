//! Transient user-facing notices
//!
//! Recognition, synthesis, and relay failures surface here as short
//! notifications; they never crash the session. The console UI drains the
//! receiving end and prints each notice as it arrives.

use tokio::sync::mpsc;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A single user-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Cloneable sending half for notices
///
/// A disabled sender drops everything, so components can emit notices
/// unconditionally without caring whether anyone is listening.
#[derive(Debug, Clone)]
pub struct NoticeSender {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl NoticeSender {
    /// Create a connected sender/receiver pair
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Create a sender that discards all notices
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an informational notice
    pub fn info(&self, text: impl Into<String>) {
        self.send(NoticeLevel::Info, text.into());
    }

    /// Emit an error notice
    pub fn error(&self, text: impl Into<String>) {
        self.send(NoticeLevel::Error, text.into());
    }

    fn send(&self, level: NoticeLevel, text: String) {
        tracing::debug!(?level, %text, "notice");
        if let Some(tx) = &self.tx {
            // Receiver dropped means the session is shutting down
            let _ = tx.send(Notice { level, text });
        }
    }
}
