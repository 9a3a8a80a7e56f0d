// Channel-backed queue used by the dispatcher tests

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::consumer::JobQueue;
use crate::types::{WorkerError, WorkerResult};

/// In-process queue backed by an unbounded channel.
///
/// `pop` returns [`WorkerError::QueueClosed`] once every sender is dropped and the
/// buffered entries are drained.
pub struct MemoryQueue {
    name: String,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

#[derive(Clone)]
pub struct MemoryQueueSender {
    tx: mpsc::UnboundedSender<String>,
}

impl MemoryQueueSender {
    pub fn push(&self, entry: impl Into<String>) -> WorkerResult<()> {
        self.tx.send(entry.into()).map_err(|_| WorkerError::QueueClosed)
    }
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> (Self, MemoryQueueSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                rx: Mutex::new(rx),
            },
            MemoryQueueSender { tx },
        )
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn pop(&self) -> WorkerResult<String> {
        self.rx.lock().await.recv().await.ok_or(WorkerError::QueueClosed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_fifo_then_closed() {
        let (queue, sender) = MemoryQueue::new("test");
        sender.push("a").unwrap();
        sender.push("b").unwrap();
        drop(sender);

        assert_eq!(queue.pop().await.unwrap(), "a");
        assert_eq!(queue.pop().await.unwrap(), "b");
        assert!(matches!(queue.pop().await, Err(WorkerError::QueueClosed)));
        assert_eq!(queue.name(), "test");
    }

    #[tokio::test]
    async fn test_memory_queue_pop_waits_for_entry() {
        let (queue, sender) = MemoryQueue::new("test");
        let popper = tokio::spawn(async move { queue.pop().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!popper.is_finished());

        sender.push("late").unwrap();
        assert_eq!(popper.await.unwrap().unwrap(), "late");
    }
}
