use std::time::{Duration, Instant};

pub const DEFAULT_TOAST_TTL: Duration = Duration::from_secs(3);
pub const UPLOAD_STATUS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
    expires_at: Instant,
}

/// Transient notifications, newest last.
#[derive(Debug, Default)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
    next_id: u64,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ToastKind, message: impl Into<String>, ttl: Duration) -> u64 {
        self.push_at(kind, message, ttl, Instant::now())
    }

    pub fn push_at(
        &mut self,
        kind: ToastKind,
        message: impl Into<String>,
        ttl: Duration,
        now: Instant,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push(Toast {
            id,
            kind,
            message: message.into(),
            expires_at: now + ttl,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) {
        self.toasts.retain(|t| t.id != id);
    }

    pub fn expire(&mut self, now: Instant) {
        self.toasts.retain(|t| t.expires_at > now);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

/// A status line that clears itself, like the upload area's label.
#[derive(Debug, Default, Clone)]
pub struct TimedStatus {
    text: Option<(String, Instant)>,
}

impl TimedStatus {
    pub fn set(&mut self, text: impl Into<String>, now: Instant) {
        self.text = Some((text.into(), now + UPLOAD_STATUS_TTL));
    }

    pub fn expire(&mut self, now: Instant) {
        if matches!(&self.text, Some((_, until)) if *until <= now) {
            self.text = None;
        }
    }

    pub fn get(&self) -> Option<&str> {
        self.text.as_ref().map(|(t, _)| t.as_str())
    }
}

/// Mirrors a toast as a desktop notification. Blocks on the notification
/// daemon, so call it off the UI thread.
pub fn show_desktop(kind: ToastKind, message: &str) -> anyhow::Result<()> {
    let summary = match kind {
        ToastKind::Success => "Twin Chat",
        ToastKind::Error => "Twin Chat: upload failed",
    };
    notify_rust::Notification::new()
        .summary(summary)
        .body(message)
        .show()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toasts_expire_after_ttl() {
        let start = Instant::now();
        let mut queue = ToastQueue::new();
        queue.push_at(ToastKind::Error, "Upload failed", UPLOAD_STATUS_TTL, start);
        queue.push_at(ToastKind::Success, "Saved", DEFAULT_TOAST_TTL, start);

        queue.expire(start + Duration::from_secs(4));
        let left: Vec<_> = queue.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(left, vec!["Upload failed"]);

        queue.expire(start + Duration::from_secs(5));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dismiss_removes_only_that_toast() {
        let mut queue = ToastQueue::new();
        let a = queue.push(ToastKind::Error, "a", DEFAULT_TOAST_TTL);
        let b = queue.push(ToastKind::Error, "b", DEFAULT_TOAST_TTL);
        assert_ne!(a, b);

        queue.dismiss(a);
        let ids: Vec<_> = queue.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b]);
    }

    #[test]
    fn test_timed_status_clears() {
        let start = Instant::now();
        let mut status = TimedStatus::default();
        status.set("Validating file...", start);
        status.expire(start + Duration::from_secs(1));
        assert_eq!(status.get(), Some("Validating file..."));

        status.set("Processing upload...", start + Duration::from_secs(2));
        status.expire(start + Duration::from_secs(6));
        assert_eq!(status.get(), Some("Processing upload..."));
        status.expire(start + Duration::from_secs(7));
        assert_eq!(status.get(), None);
    }
}
