//! Graceful-shutdown plumbing shared by the listener and the control loops.

use tokio::sync::{Mutex, RwLock, broadcast, mpsc};

// Notifier lets the accept loop and all active sessions know that the server
// is going down, and then waits for them to finish.
#[derive(Debug)]
pub struct Notifier {
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
    done_tx: RwLock<Option<mpsc::Sender<()>>>,
    done_rx: Mutex<mpsc::Receiver<()>>,
}

impl Notifier {
    pub fn new() -> Notifier {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);
        Notifier {
            shutdown_tx: RwLock::new(Some(shutdown_tx)),
            done_tx: RwLock::new(Some(done_tx)),
            done_rx: Mutex::new(done_rx),
        }
    }

    // Signals shutdown. Dropping the broadcast sender wakes every subscribed
    // Listener; dropping our own completion sender arms linger().
    pub async fn notify(&self) {
        drop(self.shutdown_tx.write().await.take());
        drop(self.done_tx.write().await.take());
    }

    // Waits until every task holding a Listener has dropped it. The mpsc
    // channel closes when the last clone of the completion sender goes out
    // of scope with its Listener.
    pub async fn linger(&self) {
        let _ = self.done_rx.lock().await.recv().await;
    }

    pub async fn subscribe(&self) -> Listener {
        let shutdown_tx = self.shutdown_tx.read().await;
        let done_tx = self.done_tx.read().await;
        Listener {
            notified: shutdown_tx.is_none(),
            shutdown_rx: shutdown_tx.as_ref().map(|tx| tx.subscribe()),
            _done_tx: done_tx.clone(),
        }
    }
}

// One subscription to the shutdown signal. Holding it marks the task as
// in-flight for linger(); dropping it marks the task done.
#[derive(Debug)]
pub struct Listener {
    notified: bool,
    shutdown_rx: Option<broadcast::Receiver<()>>,
    _done_tx: Option<mpsc::Sender<()>>,
}

impl Listener {
    // Waits for the shutdown notice. Returns immediately if it was already
    // given before this listener subscribed.
    pub async fn listen(&mut self) {
        if self.notified {
            return;
        }
        if let Some(rx) = self.shutdown_rx.as_mut() {
            // Only one value is ever sent, so a lag error cannot occur.
            let _ = rx.recv().await;
        }
        self.notified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn linger_waits_for_subscribers() {
        let notifier = std::sync::Arc::new(Notifier::new());

        let mut listener = notifier.subscribe().await;
        let held = tokio::spawn(async move {
            listener.listen().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });

        notifier.notify().await;
        notifier.linger().await;
        assert!(held.is_finished());
    }

    #[tokio::test]
    async fn late_subscribers_see_the_notice_immediately() {
        let notifier = Notifier::new();
        notifier.notify().await;
        let mut listener = notifier.subscribe().await;
        // Must not hang.
        listener.listen().await;
    }
}
