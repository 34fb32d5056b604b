use tokio::sync::broadcast;
use tracing::warn;

/// Side channel for failures that must never reach the caller (audit writes,
/// swallowed executor panics). Cloned into every component that needs it.
#[derive(Clone)]
pub struct Diagnostics {
    sender: broadcast::Sender<String>,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn note(&self, component: &str, message: impl std::fmt::Display) {
        let line = format!("[{}] {}", component, message);
        warn!(component, "{}", message);
        let _ = self.sender.send(line); // Ignored if no receivers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn note_reaches_subscribers() {
        let diag = Diagnostics::new(8);
        let mut rx = diag.subscribe();
        diag.note("audit", "request_log insert failed");
        let line = rx.recv().await.unwrap();
        assert_eq!(line, "[audit] request_log insert failed");
    }

    #[test]
    fn note_without_subscribers_is_silent() {
        let diag = Diagnostics::default();
        diag.note("audit", "nobody listening");
    }
}
