//! Worker pool processing publish jobs from a bounded queue.

use std::sync::Arc;

use changeflow_core::envelope::EventEnvelope;
use changeflow_core::error::BridgeError;
use changeflow_core::publisher::Publisher;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// A unit of work for the dispatcher: an envelope plus its routing channel.
#[derive(Debug, Clone)]
pub struct Job {
    /// Logical routing key, `erp.<aggregate>`.
    pub channel: String,
    /// The envelope to publish.
    pub envelope: EventEnvelope,
}

/// Manages a pool of workers that publish jobs from a bounded FIFO queue.
///
/// The queue is the pipeline's backpressure mechanism: when it is full,
/// [`Dispatcher::dispatch`] waits, which slows the polling side down.
pub struct Dispatcher {
    num_workers: usize,
    publisher: Arc<dyn Publisher>,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    receiver: Mutex<Option<mpsc::Receiver<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Creates a dispatcher with a queue of `job_queue_size` slots feeding
    /// `num_workers` workers.
    #[must_use]
    pub fn new(num_workers: usize, job_queue_size: usize, publisher: Arc<dyn Publisher>) -> Self {
        let (sender, receiver) = mpsc::channel(job_queue_size);
        Self {
            num_workers,
            publisher,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Launches the worker pool. Called once; subsequent calls are no-ops.
    pub async fn start(&self) {
        let Some(receiver) = self.receiver.lock().await.take() else {
            tracing::warn!("dispatcher already started");
            return;
        };
        let queue = Arc::new(Mutex::new(receiver));
        let mut workers = self.workers.lock().await;
        for id in 1..=self.num_workers {
            workers.push(tokio::spawn(worker(
                id,
                Arc::clone(&queue),
                Arc::clone(&self.publisher),
            )));
        }
    }

    /// Enqueues a job, waiting for queue capacity when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Publish`] if the dispatcher has been stopped.
    pub async fn dispatch(&self, job: Job) -> Result<(), BridgeError> {
        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            return Err(BridgeError::Publish("dispatcher is stopped".into()));
        };
        sender
            .send(job)
            .await
            .map_err(|_| BridgeError::Publish("job queue is closed".into()))
    }

    /// Initiates a graceful shutdown: closes the queue and waits for the
    /// workers to drain the remaining jobs and exit. Idempotent; concurrent
    /// calls are safe and later calls are no-ops.
    pub async fn stop(&self) {
        self.sender.lock().await.take();

        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }
        tracing::info!("dispatcher stopping, waiting for workers to drain");
        for handle in workers.drain(..) {
            if let Err(error) = handle.await {
                tracing::error!(%error, "worker task failed");
            }
        }
        tracing::info!("all workers finished, dispatcher stopped");
    }
}

/// Core loop of a single worker. Exits when the queue is closed and empty so
/// that all enqueued work drains before shutdown completes.
async fn worker(id: usize, queue: Arc<Mutex<mpsc::Receiver<Job>>>, publisher: Arc<dyn Publisher>) {
    tracing::debug!(worker_id = id, "worker started");
    loop {
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        if let Err(error) = publisher
            .publish(&job.channel, &job.envelope)
            .await
        {
            tracing::error!(
                %error,
                channel = %job.channel,
                envelope = ?job.envelope,
                "failed to publish event"
            );
        }
    }
    tracing::debug!(worker_id = id, "worker finished");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use changeflow_test_support::{FailingPublisher, RecordingPublisher};
    use serde_json::Value;

    use super::*;

    fn test_job() -> Job {
        Job {
            channel: "test".to_owned(),
            envelope: EventEnvelope::new(
                "test.created",
                "C4CA4238A0B923820DCC509A6F75849A",
                1,
                Value::String("{}".into()),
            ),
        }
    }

    async fn wait_for_publishes(publisher: &RecordingPublisher, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while publisher.publish_count() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("dispatcher did not process all jobs in time");
    }

    #[tokio::test]
    async fn test_dispatcher_processes_all_jobs() {
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::new(3, 10, Arc::clone(&publisher) as Arc<dyn Publisher>);
        dispatcher.start().await;

        for _ in 0..8 {
            dispatcher.dispatch(test_job()).await.unwrap();
        }
        wait_for_publishes(&publisher, 8).await;

        dispatcher.stop().await;
        dispatcher.stop().await; // must not panic or deadlock

        assert_eq!(publisher.publish_count(), 8);
        assert_eq!(publisher.published()[0].1.event_type, "test.created");
    }

    #[tokio::test]
    async fn test_stop_drains_enqueued_jobs() {
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::new(1, 10, Arc::clone(&publisher) as Arc<dyn Publisher>);
        dispatcher.start().await;

        for _ in 0..5 {
            dispatcher.dispatch(test_job()).await.unwrap();
        }
        dispatcher.stop().await;

        assert_eq!(publisher.publish_count(), 5);
    }

    #[tokio::test]
    async fn test_worker_continues_after_publish_failure() {
        let publisher = Arc::new(FailingPublisher::new());
        let dispatcher = Dispatcher::new(2, 10, Arc::clone(&publisher) as Arc<dyn Publisher>);
        dispatcher.start().await;

        for _ in 0..4 {
            dispatcher.dispatch(test_job()).await.unwrap();
        }
        dispatcher.stop().await;

        // Every job was attempted even though each one failed.
        assert_eq!(publisher.attempt_count(), 4);
    }

    #[tokio::test]
    async fn test_dispatch_after_stop_is_rejected() {
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::new(1, 10, Arc::clone(&publisher) as Arc<dyn Publisher>);
        dispatcher.start().await;
        dispatcher.stop().await;

        let err = dispatcher.dispatch(test_job()).await.unwrap_err();
        assert!(err.to_string().contains("stopped"));
    }

    #[tokio::test]
    async fn test_concurrent_stop_calls_are_safe() {
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Arc::new(Dispatcher::new(
            2,
            10,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
        ));
        dispatcher.start().await;
        dispatcher.dispatch(test_job()).await.unwrap();

        let a = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.stop().await })
        };
        let b = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.stop().await })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(publisher.publish_count(), 1);
    }
}
