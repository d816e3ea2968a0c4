use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, Receiver, Sender};

/// Handle for the single interruption source in the process: runtime
/// shutdown. Cloned into the accept loop, every live connection and the
/// executor; triggered by Ctrl-C or by the owner of the handle.
///
/// A subscriber created after the trigger would miss the broadcast, so the
/// flag must be consulted after subscribing: `subscribe()` first, then
/// `is_triggered()`, then wait on the receiver.
#[derive(Clone)]
pub struct Shutdown {
    tx: Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Notify all subscribers. Calling more than once is harmless.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_a_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();

        assert!(!shutdown.is_triggered());
        shutdown.trigger();

        assert!(shutdown.is_triggered());
        assert!(signal.recv().await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_the_triggered_state() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();

        shutdown.trigger();
        assert!(observer.is_triggered());
    }
}
