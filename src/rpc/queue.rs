//! Closable bounded FIFO queue.

use tokio::sync::{mpsc, watch, Mutex};

/// Bounded multi-producer, multi-consumer queue that can be closed.
///
/// Closing wakes every blocked producer and consumer. Items still buffered
/// at close time stay put until [`Queue::drain`] takes them.
#[derive(Debug)]
pub struct Queue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    closed: watch::Sender<bool>,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            tx,
            rx: Mutex::new(rx),
            closed,
        }
    }

    /// Push an item, waiting for space. Gives the item back if the queue is
    /// or becomes closed.
    pub async fn push(&self, item: T) -> Result<(), T> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(item);
        }

        tokio::select! {
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(item);
                    Ok(())
                }
                Err(_) => Err(item),
            },
            _ = until_closed(&mut closed) => Err(item),
        }
    }

    /// Pop the next item. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<T> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return None;
        }

        tokio::select! {
            item = async { self.rx.lock().await.recv().await } => item,
            _ = until_closed(&mut closed) => None,
        }
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Check whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Close the queue and take every item still buffered, including those
    /// from producers that won a slot just before the close.
    pub async fn drain(&self) -> Vec<T> {
        self.close();
        let mut rx = self.rx.lock().await;
        rx.close();

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }
}

async fn until_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_queue_fifo() {
        let queue = Queue::new(4);
        for i in 0..4 {
            queue.push(i).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(queue.pop().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_close_wakes_consumer() {
        let queue = Arc::new(Queue::<u32>::new(1));
        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(Queue::new(1));
        queue.push(1u32).await.unwrap();

        let producer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.push(2).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert_eq!(producer.await.unwrap(), Err(2));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_everything() {
        let queue = Queue::new(2);
        queue.push("buffered").await.unwrap();
        queue.close();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.push("late").await, Err("late"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_drain_takes_buffered_items() {
        let queue = Queue::new(4);
        queue.push(1u32).await.unwrap();
        queue.push(2).await.unwrap();

        assert_eq!(queue.drain().await, vec![1, 2]);
        assert!(queue.is_closed());
        assert_eq!(queue.push(3).await, Err(3));
        assert_eq!(queue.pop().await, None);
        assert!(queue.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_out_blocked_consumer() {
        let queue = Arc::new(Queue::<u32>::new(1));
        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let drained = tokio::time::timeout(Duration::from_secs(1), queue.drain())
            .await
            .unwrap();
        assert!(drained.is_empty());
        assert_eq!(consumer.await.unwrap(), None);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = Queue::<u8>::new(0);
        assert!(!queue.is_closed());
    }
}
