use crate::{Query, QueryResult, ResultSource, Results};
use dstore_core::{DatastoreError, Result};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builds results fed by a producer running on its own thread
///
/// The producer hands items through a capacity-1 queue. Every handoff races
/// the cancellation token, so closing the results or cancelling the caller
/// token unblocks a producer waiting on a slow consumer.
///
/// Pull the resulting stream from synchronous code (or through
/// [`Results::into_stream`]); pulling blocks the calling thread.
pub struct ResultBuilder {
    query: Query,
    token: CancellationToken,
}

impl ResultBuilder {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            token: CancellationToken::new(),
        }
    }

    /// Abort production when `parent` is cancelled
    pub fn cancel_on(mut self, parent: &CancellationToken) -> Self {
        self.token = parent.child_token();
        self
    }

    /// Start `produce` on a dedicated thread and return the consuming end
    ///
    /// `produce` must stop as soon as [`Producer::send`] returns `false`.
    pub fn spawn<F>(self, produce: F) -> Result<Results>
    where
        F: FnOnce(Producer) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);

        let producer = Producer {
            tx,
            token: self.token.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("dstore-producer".to_string())
            .spawn(move || produce(producer))?;

        debug!("Spawned producer for query: {}", self.query);

        Ok(Results::new(
            self.query,
            ProducerSource {
                rx,
                token: self.token,
                handle: Some(handle),
                cancel_reported: false,
            },
        ))
    }
}

/// Producing end handed to a [`ResultBuilder`] closure
pub struct Producer {
    tx: mpsc::Sender<QueryResult>,
    token: CancellationToken,
}

impl Producer {
    /// Hand one item to the consumer
    ///
    /// Blocks until the consumer takes it. Returns `false` when the consumer
    /// is gone or production was cancelled.
    pub fn send(&self, result: QueryResult) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        // The producer thread has no runtime; a plain executor drives the race.
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => false,
                sent = self.tx.send(result) => sent.is_ok(),
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token to check inside long production steps
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

struct ProducerSource {
    rx: mpsc::Receiver<QueryResult>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    cancel_reported: bool,
}

impl ResultSource for ProducerSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        match self.rx.blocking_recv() {
            Some(result) => Some(result),
            None if self.token.is_cancelled() && !self.cancel_reported => {
                self.cancel_reported = true;
                Some(Err(DatastoreError::Cancelled))
            }
            None => None,
        }
    }

    fn close(&mut self) -> Result<()> {
        self.token.cancel();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| DatastoreError::internal("query producer panicked"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Entry;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn numbered(n: usize) -> impl FnOnce(Producer) + Send + 'static {
        move |producer| {
            for i in 0..n {
                if !producer.send(Ok(Entry::key_only(format!("/{:03}", i)))) {
                    return;
                }
            }
        }
    }

    #[test]
    fn test_producer_delivers_in_order() {
        let results = ResultBuilder::new(Query::new()).spawn(numbered(50)).unwrap();
        let entries = results.rest().unwrap();
        assert_eq!(entries.len(), 50);
        assert_eq!(entries[0].key, "/000");
        assert_eq!(entries[49].key, "/049");
    }

    #[test]
    fn test_close_mid_stream_stops_producer() {
        let sent = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (sent_c, finished_c) = (sent.clone(), finished.clone());

        let mut results = ResultBuilder::new(Query::new())
            .spawn(move |producer| {
                for i in 0..10_000 {
                    if !producer.send(Ok(Entry::key_only(format!("/{}", i)))) {
                        break;
                    }
                    sent_c.fetch_add(1, Ordering::SeqCst);
                }
                finished_c.store(true, Ordering::SeqCst);
            })
            .unwrap();

        for _ in 0..3 {
            results.next().unwrap().unwrap();
        }
        results.close().unwrap();

        // close joins the producer thread
        assert!(finished.load(Ordering::SeqCst));
        assert!(sent.load(Ordering::SeqCst) < 10_000);

        // idempotent
        results.close().unwrap();
        assert!(results.next().is_none());
    }

    #[test]
    fn test_many_open_queries() {
        let mut open: Vec<Results> = (0..64)
            .map(|_| ResultBuilder::new(Query::new()).spawn(numbered(10)).unwrap())
            .collect();
        for results in open.iter_mut() {
            assert_eq!(results.next().unwrap().unwrap().key, "/000");
        }
        for results in open.iter_mut() {
            results.close().unwrap();
        }
    }

    #[test]
    fn test_close_without_consuming() {
        let mut results = ResultBuilder::new(Query::new()).spawn(numbered(100)).unwrap();
        results.close().unwrap();
        results.close().unwrap();
    }

    #[test]
    fn test_caller_cancellation_reports_once() {
        let parent = CancellationToken::new();
        let mut results = ResultBuilder::new(Query::new())
            .cancel_on(&parent)
            .spawn(|producer| {
                let mut i = 0;
                while producer.send(Ok(Entry::key_only(format!("/{}", i)))) {
                    i += 1;
                }
            })
            .unwrap();

        results.next().unwrap().unwrap();
        parent.cancel();

        let rest: Vec<QueryResult> = results.by_ref().collect();
        let errors: Vec<&QueryResult> = rest.iter().filter(|r| r.is_err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(rest.last(), Some(Err(DatastoreError::Cancelled))));
        results.close().unwrap();
    }

    #[test]
    fn test_cancel_unblocks_pending_handoff() {
        let parent = CancellationToken::new();
        let mut results = ResultBuilder::new(Query::new())
            .cancel_on(&parent)
            .spawn(numbered(1_000_000))
            .unwrap();

        // nobody pulls; the producer is parked on a handoff
        std::thread::sleep(Duration::from_millis(20));
        parent.cancel();
        results.close().unwrap();
    }
}
