use tally_store::Chain;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The single writer of one hash chain.
///
/// Every read-head/compute/append sequence for a chain is submitted here
/// and executed by one background task, one job at a time, in arrival
/// order. Two appends to the same chain can therefore never observe the
/// same head. Jobs run on the blocking pool because store writes may
/// `fsync`.
///
/// Cloning yields another handle to the same task. The task exits when
/// the last handle is dropped.
#[derive(Clone)]
pub struct ChainWriter {
    chain: Chain,
    tx: mpsc::Sender<Job>,
}

impl ChainWriter {
    /// Start the writer task. Must be called within a tokio runtime.
    pub fn spawn(chain: Chain, queue: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(queue.max(1));

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // A panicking job drops its reply sender; the caller sees
                // `WriterStopped` and the writer keeps serving.
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    debug!(%chain, error = %e, "chain writer job aborted");
                }
            }
            debug!(%chain, "chain writer stopped");
        });

        Self { chain, tx }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Run `work` on the writer and wait for its result.
    pub async fn submit<T, F>(&self, work: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> LedgerResult<T> + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move || {
            // The caller may have given up waiting.
            let _ = reply.send(work());
        });

        self.tx
            .send(job)
            .await
            .map_err(|_| LedgerError::WriterStopped(self.chain))?;
        result
            .await
            .map_err(|_| LedgerError::WriterStopped(self.chain))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn returns_job_result() {
        let writer = ChainWriter::spawn(Chain::Operational, 4);
        let value = writer.submit(|| Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn propagates_job_error() {
        let writer = ChainWriter::spawn(Chain::Fiscal, 4);
        let err = writer
            .submit::<(), _>(|| Err(LedgerError::WriterStopped(Chain::Operational)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::WriterStopped(Chain::Operational)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn jobs_never_overlap() {
        let writer = ChainWriter::spawn(Chain::Fiscal, 1);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let writer = writer.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                writer
                    .submit(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(2));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_job_reports_stopped_and_writer_survives() {
        let writer = ChainWriter::spawn(Chain::Fiscal, 4);
        let err = writer
            .submit::<(), _>(|| panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::WriterStopped(Chain::Fiscal)));
        assert_eq!(writer.submit(|| Ok(7)).await.unwrap(), 7);
    }
}
