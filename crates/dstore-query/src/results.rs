use crate::{Entry, Query, QueryResult};
use dstore_core::{DatastoreError, Result};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Backend-facing seam of a results stream
///
/// A source hands out one item per pull and releases whatever it holds on
/// `close`. `Results` guarantees `close` runs at most once and that no pull
/// happens after it.
pub trait ResultSource: Send {
    /// Produce the next item, or `None` once exhausted
    fn next_result(&mut self) -> Option<QueryResult>;

    /// Release cursors and stop any background production
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// First error met by [`Results::rest`], with the entries drained before it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RestError {
    pub entries: Vec<Entry>,
    pub error: DatastoreError,
}

impl RestError {
    pub fn into_parts(self) -> (Vec<Entry>, DatastoreError) {
        (self.entries, self.error)
    }
}

impl From<RestError> for DatastoreError {
    fn from(err: RestError) -> Self {
        err.error
    }
}

/// "Produce next item" half of [`ResultsIterator`]
pub type NextFn = Box<dyn FnMut() -> Option<QueryResult> + Send>;
/// Optional "close" half of [`ResultsIterator`]
pub type CloseFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Function pair turned into a results stream by [`Results::from_iterator`]
pub struct ResultsIterator {
    next: NextFn,
    close: Option<CloseFn>,
}

impl ResultsIterator {
    pub fn new<F>(next: F) -> Self
    where
        F: FnMut() -> Option<QueryResult> + Send + 'static,
    {
        Self {
            next: Box::new(next),
            close: None,
        }
    }

    pub fn with_close<F>(mut self, close: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.close = Some(Box::new(close));
        self
    }
}

impl ResultSource for ResultsIterator {
    fn next_result(&mut self) -> Option<QueryResult> {
        (self.next)()
    }

    fn close(&mut self) -> Result<()> {
        match self.close.take() {
            Some(close) => close(),
            None => Ok(()),
        }
    }
}

/// In-memory source; needs no background task
struct VecSource {
    items: std::vec::IntoIter<QueryResult>,
}

impl ResultSource for VecSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        self.items.next()
    }
}

/// Lazy, closeable, consume-once stream of query results
///
/// Pull with [`Iterator::next`]; iterate with `for`; drain with
/// [`Results::rest`]. Exhausting the stream closes it. A close failure at
/// exhaustion is surfaced as one final error item. Dropping an open stream
/// closes it as well.
pub struct Results {
    query: Query,
    source: Option<Box<dyn ResultSource>>,
}

impl Results {
    /// Wrap a source
    pub fn new(query: Query, source: impl ResultSource + 'static) -> Self {
        Self {
            query,
            source: Some(Box::new(source)),
        }
    }

    /// Build a stream from a "next" function and an optional "close" function
    pub fn from_iterator(query: Query, iter: ResultsIterator) -> Self {
        Self::new(query, iter)
    }

    /// Stream over already materialized entries
    pub fn from_entries(query: Query, entries: Vec<Entry>) -> Self {
        Self::from_results(query, entries.into_iter().map(Ok).collect())
    }

    /// Stream over already materialized items, errors included
    pub fn from_results(query: Query, items: Vec<QueryResult>) -> Self {
        Self::new(
            query,
            VecSource {
                items: items.into_iter(),
            },
        )
    }

    /// Query that produced this stream
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Same stream, reporting a different originating query
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Drain every remaining entry
    ///
    /// Stops at the first error item. The entries drained before it travel
    /// with the error in [`RestError`]. The stream is closed either way.
    pub fn rest(mut self) -> std::result::Result<Vec<Entry>, RestError> {
        let mut entries = Vec::new();
        while let Some(result) = self.next() {
            match result {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    if let Err(close_err) = self.close() {
                        warn!("Failed to close results after error: {}", close_err);
                    }
                    return Err(RestError { entries, error });
                }
            }
        }
        Ok(entries)
    }

    /// Release the stream; calling it again is a no-op
    pub fn close(&mut self) -> Result<()> {
        match self.source.take() {
            Some(mut source) => {
                debug!("Closing results for query: {}", self.query);
                source.close()
            }
            None => Ok(()),
        }
    }
}

impl Iterator for Results {
    type Item = QueryResult;

    fn next(&mut self) -> Option<QueryResult> {
        let source = self.source.as_mut()?;
        match source.next_result() {
            Some(result) => Some(result),
            None => self.close().err().map(Err),
        }
    }
}

impl Drop for Results {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close dropped results: {}", e);
        }
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("query", &self.query)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstore_core::DatastoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SAMPLE_KEYS: &[&str] = &[
        "/ab/c", "/ab/cd", "/ab/ef", "/ab/fg", "/a", "/abce", "/abcf", "/ab",
    ];

    fn counting_iterator(close_calls: Option<Arc<AtomicUsize>>) -> ResultsIterator {
        let mut i = 0;
        let iter = ResultsIterator::new(move || {
            let key = SAMPLE_KEYS.get(i)?;
            i += 1;
            Some(Ok(Entry::key_only(*key)))
        });
        match close_calls {
            Some(calls) => iter.with_close(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            None => iter,
        }
    }

    fn keys(entries: &[Entry]) -> Vec<String> {
        entries.iter().map(|e| e.key.clone()).collect()
    }

    #[test]
    fn test_from_iterator_pull_closes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut results = Results::from_iterator(Query::new(), counting_iterator(Some(calls.clone())));

        let mut seen = Vec::new();
        while let Some(result) = results.next() {
            seen.push(result.unwrap().key);
        }
        assert_eq!(seen, SAMPLE_KEYS);
        assert!(results.is_closed());

        results.close().unwrap();
        drop(results);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_iterator_rest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let results = Results::from_iterator(Query::new(), counting_iterator(Some(calls.clone())));
        let entries = results.rest().unwrap();
        assert_eq!(keys(&entries), SAMPLE_KEYS);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_iterator_for_loop_without_close() {
        let results = Results::from_iterator(Query::new(), counting_iterator(None));
        let seen: Vec<String> = results.map(|r| r.unwrap().key).collect();
        assert_eq!(seen, SAMPLE_KEYS);
    }

    #[test]
    fn test_close_before_drain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut results = Results::from_iterator(Query::new(), counting_iterator(Some(calls.clone())));

        assert!(results.next().is_some());
        results.close().unwrap();
        assert!(results.next().is_none());
        results.close().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_untouched_and_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let _results =
                Results::from_iterator(Query::new(), counting_iterator(Some(calls.clone())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rest_returns_first_error() {
        let results = Results::from_results(
            Query::new(),
            vec![
                Ok(Entry::key_only("/a")),
                Err(DatastoreError::internal("boom")),
                Ok(Entry::key_only("/b")),
            ],
        );
        let (entries, err) = results.rest().unwrap_err().into_parts();
        assert!(matches!(err, DatastoreError::Internal { .. }));
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/a"]);
    }

    #[test]
    fn test_rest_error_converts_to_datastore_error() {
        fn drain(results: Results) -> Result<Vec<Entry>> {
            Ok(results.rest()?)
        }
        let results = Results::from_results(
            Query::new(),
            vec![Err(DatastoreError::Cancelled), Ok(Entry::key_only("/a"))],
        );
        assert!(matches!(drain(results), Err(DatastoreError::Cancelled)));
    }

    #[test]
    fn test_close_error_surfaces_at_exhaustion() {
        let results = Results::from_iterator(
            Query::new(),
            ResultsIterator::new(|| None).with_close(|| Err(DatastoreError::internal("close failed"))),
        );
        let items: Vec<QueryResult> = results.collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn test_query_introspection() {
        let q = Query::new().with_limit(3);
        let results = Results::from_entries(q, vec![]);
        assert_eq!(results.query().limit, 3);

        let results = results.with_query(Query::new());
        assert_eq!(results.query().limit, 0);
    }
}
