use dstore_core::{DatastoreError, Key, Result};
use dstore_query::order;
use dstore_query::{Order, QueryResult, ResultSource, Results};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::warn;

/// One child stream, with keys lifted back under its mount prefix
struct Cursor {
    mount: Key,
    results: Option<Results>,
}

impl Cursor {
    fn advance(&mut self) -> Option<QueryResult> {
        let results = self.results.as_mut()?;
        match results.next() {
            Some(Ok(mut entry)) => {
                entry.key = self.mount.child(&Key::raw(entry.key)).into();
                Some(Ok(entry))
            }
            Some(Err(err)) => {
                // an erroring child is finished; report it once
                self.close_quietly();
                Some(Err(err.at_mount("querying", self.mount.as_str())))
            }
            None => {
                self.results = None;
                None
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.results.take() {
            Some(mut results) => results
                .close()
                .map_err(|e| e.at_mount("closing query on", self.mount.as_str())),
            None => Ok(()),
        }
    }

    fn close_quietly(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close failed child query: {}", e);
        }
    }
}

/// Head of one cursor, ordered for a min-first `BinaryHeap`
struct CmpEntry {
    offset: usize,
    item: QueryResult,
    orders: Arc<[Order]>,
}

impl PartialEq for CmpEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CmpEntry {}

impl PartialOrd for CmpEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CmpEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_item = match (&self.item, &other.item) {
            (Err(_), Err(_)) => Ordering::Equal,
            (Err(_), Ok(_)) => Ordering::Less,
            (Ok(_), Err(_)) => Ordering::Greater,
            (Ok(a), Ok(b)) => {
                order::compare(&self.orders, a, b).then_with(|| a.key.cmp(&b.key))
            }
        };
        by_item.then(self.offset.cmp(&other.offset)).reverse()
    }
}

/// K-way merge of sorted child streams
///
/// Each child must already yield its entries in `orders`; the merge keeps
/// that order across children, breaking ties by key and then by the order
/// the children were added. Error items jump the queue.
///
/// Children are not pulled until the merged stream is.
pub(crate) struct QuerySet {
    cursors: Vec<Cursor>,
    heap: BinaryHeap<CmpEntry>,
    orders: Arc<[Order]>,
    primed: bool,
}

impl QuerySet {
    pub(crate) fn new(orders: &[Order]) -> Self {
        let orders: Arc<[Order]> = if orders.is_empty() {
            Arc::from(vec![Order::ByKey])
        } else {
            Arc::from(orders.to_vec())
        };
        Self {
            cursors: Vec::new(),
            heap: BinaryHeap::new(),
            orders,
            primed: false,
        }
    }

    /// Orders the children are expected to produce
    pub(crate) fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub(crate) fn add(&mut self, mount: Key, results: Results) {
        self.cursors.push(Cursor {
            mount,
            results: Some(results),
        });
    }

    fn prime(&mut self) {
        self.primed = true;
        for offset in 0..self.cursors.len() {
            self.refill(offset);
        }
    }

    fn refill(&mut self, offset: usize) {
        if let Some(item) = self.cursors[offset].advance() {
            self.heap.push(CmpEntry {
                offset,
                item,
                orders: Arc::clone(&self.orders),
            });
        }
    }
}

impl ResultSource for QuerySet {
    fn next_result(&mut self) -> Option<QueryResult> {
        if !self.primed {
            self.prime();
        }
        let head = self.heap.pop()?;
        self.refill(head.offset);
        Some(head.item)
    }

    fn close(&mut self) -> Result<()> {
        self.primed = true;
        self.heap.clear();
        let mut first: Option<DatastoreError> = None;
        for cursor in &mut self.cursors {
            if let Err(e) = cursor.close() {
                warn!("{}", e);
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
