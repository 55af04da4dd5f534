//! Graceful shutdown fan-out.
//!
//! # Design Decisions
//! - One `broadcast` channel of capacity 1; a single `trigger` wakes every
//!   subscriber, later triggers are dropped
//! - Subscribe before spawning a task, so a trigger that races the spawn is
//!   never missed

use tokio::sync::broadcast;

pub struct Shutdown {
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// No-op when nobody is subscribed.
    pub fn trigger(&self) {
        let _ = self.notify.send(());
    }

    /// Tasks that will observe the next trigger.
    pub fn receiver_count(&self) -> usize {
        self.notify.receiver_count()
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
    async fn test_trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut server = shutdown.subscribe();
        let mut worker = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        assert!(server.recv().await.is_ok());
        assert!(worker.recv().await.is_ok());
    }

    #[test]
    fn test_trigger_without_subscribers_is_harmless() {
        let shutdown = Shutdown::default();
        shutdown.trigger();
        assert_eq!(shutdown.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_not_counted() {
        let shutdown = Shutdown::new();
        let kept = shutdown.subscribe();
        drop(shutdown.subscribe());
        assert_eq!(shutdown.receiver_count(), 1);
        drop(kept);
    }
}
