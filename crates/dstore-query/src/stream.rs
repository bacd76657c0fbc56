use crate::{QueryResult, Results};
use dstore_core::{DatastoreError, Result};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl Results {
    /// Push mode: pull this stream on a blocking task and expose it as an async `Stream`
    ///
    /// Must be called from within a tokio runtime.
    pub fn into_stream(self) -> ResultStream {
        self.into_stream_with(CancellationToken::new())
    }

    /// Like [`Results::into_stream`], aborting production when `parent` is cancelled
    pub fn into_stream_cancel_on(self, parent: &CancellationToken) -> ResultStream {
        self.into_stream_with(parent.child_token())
    }

    fn into_stream_with(mut self, token: CancellationToken) -> ResultStream {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::runtime::Handle::current();
        let task_token = token.clone();

        let task = tokio::task::spawn_blocking(move || {
            while !task_token.is_cancelled() {
                let Some(item) = self.next() else {
                    break;
                };
                let delivered = handle.block_on(async {
                    tokio::select! {
                        biased;
                        _ = task_token.cancelled() => false,
                        sent = tx.send(item) => sent.is_ok(),
                    }
                });
                if !delivered {
                    break;
                }
            }
            debug!("Push task finished for query: {}", self.query());
            self.close()
        });

        ResultStream {
            inner: ReceiverStream::new(rx),
            token,
            task: Some(task),
            cancel_reported: false,
            closed: false,
        }
    }
}

/// Async push-mode view of a [`Results`] stream
///
/// Yields the same items in the same order as pulling the results directly.
/// Dropping it cancels the pulling task, which then closes the results.
pub struct ResultStream {
    inner: ReceiverStream<QueryResult>,
    token: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    cancel_reported: bool,
    closed: bool,
}

impl ResultStream {
    /// Stop production, wait for the pulling task and close the results
    ///
    /// Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.token.cancel();
        self.inner.close();

        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| DatastoreError::internal(format!("push task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}

impl Stream for ResultStream {
    type Item = QueryResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(None) if self.token.is_cancelled() && !self.cancel_reported => {
                self.cancel_reported = true;
                Poll::Ready(Some(Err(DatastoreError::Cancelled)))
            }
            other => other,
        }
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
