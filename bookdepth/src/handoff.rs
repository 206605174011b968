//! Bounded handoff queue between the network task and the book consumer.
//!
//! Built on `tokio::sync::broadcast` with a single receiver: sending never
//! blocks, and when the consumer falls behind the oldest queued message is
//! overwritten. The consumer learns how many messages it lost and can decide
//! to resynchronise.

use tokio::sync::broadcast;

/// Create a queue holding at least `capacity` messages (rounded up to a power
/// of two).
pub fn channel(capacity: usize) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (HandoffSender { tx }, HandoffReceiver { rx })
}

/// What the consumer pulled from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// The next raw message, in enqueue order.
    Message(String),
    /// The queue overflowed and this many of the oldest messages were lost.
    Dropped(u64),
}

#[derive(Debug, Clone)]
pub struct HandoffSender {
    tx: broadcast::Sender<String>,
}

impl HandoffSender {
    /// Enqueue without blocking. Returns `false` if the consumer is gone.
    pub fn send(&self, raw: String) -> bool {
        self.tx.send(raw).is_ok()
    }
}

#[derive(Debug)]
pub struct HandoffReceiver {
    rx: broadcast::Receiver<String>,
}

impl HandoffReceiver {
    /// Wait for the next item. `None` once every sender is dropped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Handoff> {
        match self.rx.recv().await {
            Ok(raw) => Some(Handoff::Message(raw)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Handoff::Dropped(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is
    /// queued right now.
    pub fn try_recv(&mut self) -> Option<Handoff> {
        match self.rx.try_recv() {
            Ok(raw) => Some(Handoff::Message(raw)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Handoff::Dropped(n)),
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => None,
        }
    }

    /// Discard everything currently queued. Returns how many messages were
    /// thrown away (including ones already lost to overflow).
    pub fn discard(&mut self) -> u64 {
        let mut discarded = 0;
        while let Some(item) = self.try_recv() {
            discarded += match item {
                Handoff::Message(_) => 1,
                Handoff::Dropped(n) => n,
            };
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_enqueue_order() {
        let (tx, mut rx) = channel(16);
        for i in 0..10 {
            assert!(tx.send(format!("m{i}")));
        }
        for i in 0..10 {
            assert_eq!(rx.recv().await, Some(Handoff::Message(format!("m{i}"))));
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (tx, mut rx) = channel(4);
        for i in 0..6 {
            tx.send(format!("m{i}"));
        }
        assert_eq!(rx.recv().await, Some(Handoff::Dropped(2)));
        for i in 2..6 {
            assert_eq!(rx.recv().await, Some(Handoff::Message(format!("m{i}"))));
        }
    }

    #[tokio::test]
    async fn closes_after_senders_drop() {
        let (tx, mut rx) = channel(4);
        tx.send("last".into());
        drop(tx);
        assert_eq!(rx.recv().await, Some(Handoff::Message("last".into())));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn send_without_receiver_reports_false() {
        let (tx, rx) = channel(4);
        drop(rx);
        assert!(!tx.send("orphan".into()));
    }

    #[tokio::test]
    async fn ordering_holds_under_concurrent_producer() {
        let (tx, mut rx) = channel(4096);
        let producer = tokio::spawn(async move {
            for i in 0..1000u32 {
                tx.send(i.to_string());
                if i % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut expected = 0u32;
        while let Some(item) = rx.recv().await {
            match item {
                Handoff::Message(raw) => {
                    assert_eq!(raw, expected.to_string());
                    expected += 1;
                }
                Handoff::Dropped(n) => panic!("unexpected drop of {n}"),
            }
        }
        producer.await.unwrap();
        assert_eq!(expected, 1000);
    }

    #[test]
    fn discard_empties_queue() {
        let (tx, mut rx) = channel(8);
        for i in 0..5 {
            tx.send(i.to_string());
        }
        assert_eq!(rx.discard(), 5);
        assert!(rx.try_recv().is_none());
    }
}
