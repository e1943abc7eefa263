//! Per-adapter serialized operation queue.
//!
//! One worker task owns the queue and runs submitted jobs strictly in
//! order. Each job runs in its own task so a panic is logged and the next
//! job still runs.

use std::future::Future;
use std::sync::Mutex;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::error::QueueError;

type Job = BoxFuture<'static, ()>;

#[derive(Debug)]
pub struct OperationQueue {
    label: String,
    sender: mpsc::UnboundedSender<Job>,
    // Taken by the first submission, which starts the worker on the
    // caller's runtime.
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
}

impl OperationQueue {
    pub fn new(label: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            label: label.into(),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Queue `operation` behind everything submitted earlier and wait for
    /// its output.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_worker();

        let (reply, response) = oneshot::channel();
        let job = async move {
            let _ = reply.send(operation.await);
        }
        .boxed();

        self.sender
            .send(job)
            .map_err(|_| QueueError::Closed(self.label.clone()))?;
        response
            .await
            .map_err(|_| QueueError::Dropped(self.label.clone()))
    }

    fn ensure_worker(&self) {
        let receiver = match self.receiver.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut receiver) = receiver else {
            return;
        };
        let label = self.label.clone();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(err) = tokio::spawn(job).await {
                    tracing::error!(queue = %label, error = %err, "queued operation failed");
                }
            }
            tracing::debug!(queue = %label, "operation queue closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn operations_run_in_submission_order() {
        let queue = Arc::new(OperationQueue::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let queue = queue.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .run(async move {
                        // Earlier jobs sleep longer; order must still hold.
                        tokio::time::sleep(Duration::from_millis(25 - i * 5)).await;
                        log.lock().unwrap().push(i);
                    })
                    .await
            }));
            // Fix the submission order.
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn panicking_job_does_not_block_the_next() {
        let queue = OperationQueue::new("test");
        let failed = queue.run::<_, ()>(async { panic!("boom") }).await;
        assert!(matches!(failed, Err(QueueError::Dropped(_))));

        let value = queue.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn jobs_never_overlap() {
        let queue = Arc::new(OperationQueue::new("test"));
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let tasks = (0..8).map(|_| {
            let queue = queue.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            async move {
                queue
                    .run(async move {
                        use std::sync::atomic::Ordering;
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }
        });
        futures_util::future::join_all(tasks).await;
        assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
