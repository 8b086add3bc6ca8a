//! Result channel — worker output funneled to the single consumer
//!
//! Background workers push display tuples through a clonable `ResultSender`;
//! the interface owns the one `Dispatcher` and drains it on its own cadence.
//! The queue is unbounded, so pushing never blocks a worker.

use parlor_core::DisplayTuple;
use tokio::sync::mpsc;

/// Create a connected sender / dispatcher pair.
pub fn result_channel() -> (ResultSender, Dispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, Dispatcher { rx })
}

#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::UnboundedSender<DisplayTuple>,
}

impl ResultSender {
    /// Enqueue a tuple. After the dispatcher is dropped the tuple is discarded.
    pub fn push(&self, tuple: DisplayTuple) {
        if let Err(e) = self.tx.send(tuple) {
            tracing::debug!(sender = %e.0.sender, "Dispatcher gone, display tuple discarded");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<DisplayTuple>,
}

impl Dispatcher {
    /// Take everything queued so far, oldest first. Returns immediately when empty.
    pub fn drain_all(&mut self) -> Vec<DisplayTuple> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_push_order() {
        let (tx, mut dispatcher) = result_channel();
        let t1 = DisplayTuple::user("You", "one");
        let t2 = DisplayTuple::bot("AI Assistant", "two");
        let t3 = DisplayTuple::system("System", "three");

        tx.push(t1.clone());
        tx.push(t2.clone());
        tx.push(t3.clone());

        assert_eq!(dispatcher.drain_all(), vec![t1, t2, t3]);
        assert!(dispatcher.drain_all().is_empty());
    }

    #[test]
    fn test_drain_empty_queue_returns_immediately() {
        let (_tx, mut dispatcher) = result_channel();
        assert!(dispatcher.drain_all().is_empty());
    }

    #[test]
    fn test_push_after_dispatcher_dropped_is_silent() {
        let (tx, dispatcher) = result_channel();
        drop(dispatcher);
        assert!(tx.is_closed());
        tx.push(DisplayTuple::system("System", "nobody listening"));
    }

    #[tokio::test]
    async fn test_concurrent_producers_keep_per_producer_order() {
        let (tx, mut dispatcher) = result_channel();

        let mut handles = Vec::new();
        for producer in 0..4 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..25 {
                    tx.push(DisplayTuple::bot(format!("p{producer}"), seq.to_string()));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let drained = dispatcher.drain_all();
        assert_eq!(drained.len(), 100);
        for producer in 0..4 {
            let sender = format!("p{producer}");
            let seqs: Vec<u32> = drained
                .iter()
                .filter(|t| t.sender == sender)
                .map(|t| t.text.parse().unwrap())
                .collect();
            assert_eq!(seqs, (0..25).collect::<Vec<u32>>());
        }
    }
}
