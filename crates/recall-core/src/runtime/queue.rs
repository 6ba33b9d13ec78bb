//! Pull-based work sequence for one session.
//!
//! The only suspension point is [`WorkSource::next_item`], which observes the
//! pass's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RecallError, Result};
use crate::models::PendingMessage;
use crate::storage::MessageQueueStorage;

/// Ordered, restartable supply of work items per session.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Next item of the session in arrival order, or `None` at end-of-stream.
    async fn next_item(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PendingMessage>>;

    /// Mark an item consumed.
    fn ack(&self, message: &PendingMessage) -> Result<()>;

    /// Put an item back at its original position.
    fn requeue(&self, message: &PendingMessage) -> Result<()>;

    /// Items still waiting for the session.
    fn pending(&self, session_id: &str) -> Result<usize>;
}

/// [`WorkSource`] backed by the persistent message queue.
///
/// When the queue is empty it waits up to `idle_timeout` for an enqueue
/// notification before reporting end-of-stream.
#[derive(Clone)]
pub struct StorageWorkSource {
    queue: MessageQueueStorage,
    notify: Arc<Notify>,
    idle_timeout: Duration,
}

impl StorageWorkSource {
    pub fn new(queue: MessageQueueStorage) -> Self {
        let notify = queue.notifier();
        Self {
            queue,
            notify,
            idle_timeout: Duration::ZERO,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

#[async_trait]
impl WorkSource for StorageWorkSource {
    async fn next_item(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<PendingMessage>> {
        let deadline = Instant::now() + self.idle_timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(RecallError::Cancelled);
            }

            // Register before claiming so an enqueue between the two is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.queue.claim_next(session_id)? {
                return Ok(Some(message));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RecallError::Cancelled),
                _ = &mut notified => continue,
                _ = sleep_until(deadline) => {
                    debug!(session_id, "No work before idle timeout");
                    return Ok(self.queue.claim_next(session_id)?);
                }
            }
        }
    }

    fn ack(&self, message: &PendingMessage) -> Result<()> {
        self.queue.ack(&message.id)?;
        Ok(())
    }

    fn requeue(&self, message: &PendingMessage) -> Result<()> {
        self.queue.requeue(&message.id)?;
        Ok(())
    }

    fn pending(&self, session_id: &str) -> Result<usize> {
        Ok(self.queue.pending_count(session_id)?)
    }
}

/// Single-consumer iterator over one session's work. Once it reports
/// end-of-stream it stays finished.
pub struct MessageIterator {
    source: Arc<dyn WorkSource>,
    session_id: String,
    cancel: CancellationToken,
    finished: bool,
}

impl MessageIterator {
    pub fn new(
        source: Arc<dyn WorkSource>,
        session_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            session_id: session_id.into(),
            cancel,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<PendingMessage>> {
        if self.finished {
            return Ok(None);
        }
        let next = self.source.next_item(&self.session_id, &self.cancel).await?;
        if next.is_none() {
            self.finished = true;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItem;
    use crate::storage::Storage;
    use recall_ai::SummaryInput;
    use tempfile::tempdir;

    fn setup() -> (Storage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        (storage, temp_dir)
    }

    fn summarize() -> WorkItem {
        WorkItem::Summarize(SummaryInput::default())
    }

    #[tokio::test]
    async fn test_empty_queue_ends_immediately_without_idle_timeout() {
        let (storage, _temp_dir) = setup();
        let source = StorageWorkSource::new(storage.queue.clone());
        let cancel = CancellationToken::new();
        assert!(source.next_item("s1", &cancel).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_late_item() {
        let (storage, _temp_dir) = setup();
        let source = StorageWorkSource::new(storage.queue.clone())
            .with_idle_timeout(Duration::from_secs(5));

        let queue = storage.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            queue.enqueue("s1", WorkItem::Summarize(SummaryInput::default())).unwrap();
        });

        let cancel = CancellationToken::new();
        let message = source.next_item("s1", &cancel).await.unwrap();
        assert!(message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_reports_end_of_stream() {
        let (storage, _temp_dir) = setup();
        let source = StorageWorkSource::new(storage.queue.clone())
            .with_idle_timeout(Duration::from_millis(200));
        let cancel = CancellationToken::new();
        assert!(source.next_item("s1", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let (storage, _temp_dir) = setup();
        let source = StorageWorkSource::new(storage.queue.clone())
            .with_idle_timeout(Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = source.next_item("s1", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_iterator_is_ordered_and_fused() {
        let (storage, _temp_dir) = setup();
        let first = storage.queue.enqueue("s1", summarize()).unwrap();
        let second = storage.queue.enqueue("s1", summarize()).unwrap();
        storage.queue.enqueue("s2", summarize()).unwrap();

        let source: Arc<dyn WorkSource> = Arc::new(StorageWorkSource::new(storage.queue.clone()));
        let mut items = MessageIterator::new(source.clone(), "s1", CancellationToken::new());

        let got = items.next().await.unwrap().unwrap();
        assert_eq!(got.id, first.id);
        source.ack(&got).unwrap();
        let got = items.next().await.unwrap().unwrap();
        assert_eq!(got.id, second.id);
        source.ack(&got).unwrap();

        assert!(items.next().await.unwrap().is_none());
        storage.queue.enqueue("s1", summarize()).unwrap();
        assert!(items.next().await.unwrap().is_none());
        assert_eq!(source.pending("s2").unwrap(), 1);
    }
}
