//! Fan-out of progress events to any number of observers
//!
//! Backed by a bounded `tokio::sync::broadcast` channel: publishing never
//! blocks, and an observer that falls behind loses the oldest events.

use tokio::sync::broadcast;

pub const PROGRESS_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ProgressChannel<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> ProgressChannel<T> {
    pub fn new() -> Self {
        Self::with_capacity(PROGRESS_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send to every current observer; a missing audience is not an error.
    pub fn publish(&self, event: T) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for ProgressChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_without_observers() {
        let channel: ProgressChannel<u32> = ProgressChannel::new();
        channel.publish(1);
        assert_eq!(channel.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_observer_drops_oldest() {
        let channel = ProgressChannel::with_capacity(2);
        let mut rx = channel.subscribe();
        for i in 0..5u32 {
            channel.publish(i);
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap(), 3);
        assert_eq!(rx.recv().await.unwrap(), 4);
    }
}
