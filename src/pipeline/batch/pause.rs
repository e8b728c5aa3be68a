use std::sync::Arc;
use tokio::sync::watch;

/// Shared pause flag for a batch run.
///
/// Clones observe and drive the same flag. Waiters are woken by `resume`
/// rather than polling.
#[derive(Debug, Clone)]
pub struct PauseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PauseHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is clear. Returns whether it had to wait.
    pub async fn wait_until_resumed(&self) -> bool {
        let mut rx = self.tx.subscribe();
        if !*rx.borrow_and_update() {
            return false;
        }
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|paused| !*paused).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_not_paused() {
        let handle = PauseHandle::new();
        assert!(!handle.wait_until_resumed().await);
    }

    #[tokio::test]
    async fn test_resume_wakes_waiter() {
        let handle = PauseHandle::new();
        handle.pause();
        assert!(handle.is_paused());

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_until_resumed().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        handle.resume();
        let waited = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(waited);
        assert!(!handle.is_paused());
    }
}
