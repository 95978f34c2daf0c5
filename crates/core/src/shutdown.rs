// Shutdown Token

use tokio::sync::watch;

/// Cooperative stop signal shared by the dispatch loop and in-flight runs
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Returns immediately if shutdown was already requested. If the sender
    /// is dropped without signalling, this never completes.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// A token that is never signalled (one-off runs outside the scheduler)
    pub fn never() -> Self {
        // A dropped sender leaves `wait` pending forever
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }
}

/// Shutdown sender
#[derive(Debug)]
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Hand out another token for the same signal
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_signal() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        let waiter = tokio::spawn(async move {
            token.wait().await;
            token.is_shutdown()
        });
        tx.shutdown();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_after_signal_is_immediate() {
        let (tx, mut token) = shutdown_channel();
        tx.shutdown();
        tokio::time::timeout(Duration::from_millis(100), token.wait())
            .await
            .expect("already signalled token must not block");
    }

    #[tokio::test]
    async fn test_subscribed_tokens_share_signal() {
        let (tx, token) = shutdown_channel();
        let other = tx.subscribe();
        tx.shutdown();
        assert!(token.is_shutdown());
        assert!(other.is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_token_stays_pending() {
        let mut token = ShutdownToken::never();
        let waited = tokio::time::timeout(Duration::from_secs(3600), token.wait()).await;
        assert!(waited.is_err());
    }
}
