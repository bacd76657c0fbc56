//! Generic post-processing for backends that cannot evaluate part of a query
//!
//! Error items always pass through and never count toward offset or limit.

use crate::{order, Entry, Filter, Order, Query, QueryResult, ResultSource, Results};
use dstore_core::Result;
use std::collections::VecDeque;

struct FilterSource {
    input: Results,
    filter: Filter,
}

impl ResultSource for FilterSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        loop {
            match self.input.next()? {
                Ok(entry) if !self.filter.matches(&entry) => continue,
                other => return Some(other),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }
}

/// Forward entries for which `filter` matches
pub fn naive_filter(input: Results, filter: Filter) -> Results {
    let query = input.query().clone();
    Results::new(query, FilterSource { input, filter })
}

struct LimitSource {
    input: Results,
    remaining: usize,
}

impl ResultSource for LimitSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        if self.remaining == 0 {
            if let Err(e) = self.input.close() {
                return Some(Err(e));
            }
            return None;
        }
        let result = self.input.next()?;
        if result.is_ok() {
            self.remaining -= 1;
        }
        Some(result)
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }
}

/// Forward at most `limit` entries, then close the input
///
/// A limit of 0 forwards nothing. Query composition treats 0 as unbounded
/// and skips this operator instead.
pub fn naive_limit(input: Results, limit: usize) -> Results {
    let query = input.query().clone();
    Results::new(
        query,
        LimitSource {
            input,
            remaining: limit,
        },
    )
}

struct OffsetSource {
    input: Results,
    to_skip: usize,
}

impl ResultSource for OffsetSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        loop {
            match self.input.next()? {
                Ok(_) if self.to_skip > 0 => self.to_skip -= 1,
                other => return Some(other),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }
}

/// Skip the first `offset` entries
pub fn naive_offset(input: Results, offset: usize) -> Results {
    let query = input.query().clone();
    Results::new(
        query,
        OffsetSource {
            input,
            to_skip: offset,
        },
    )
}

struct OrderSource {
    input: Results,
    orders: Vec<Order>,
    buffered: Option<VecDeque<QueryResult>>,
}

impl OrderSource {
    /// Drain the input; errors keep their arrival order ahead of the sorted entries
    fn fill(&mut self) -> VecDeque<QueryResult> {
        let mut errors = Vec::new();
        let mut entries: Vec<Entry> = Vec::new();
        for result in self.input.by_ref() {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => errors.push(Err(e)),
            }
        }
        if let Err(e) = self.input.close() {
            errors.push(Err(e));
        }

        order::sort(&self.orders, &mut entries);

        errors.into_iter().chain(entries.into_iter().map(Ok)).collect()
    }
}

impl ResultSource for OrderSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        if self.buffered.is_none() {
            self.buffered = Some(self.fill());
        }
        self.buffered.as_mut()?.pop_front()
    }

    fn close(&mut self) -> Result<()> {
        self.buffered = None;
        self.input.close()
    }
}

/// Sort the whole input under the composite comparator
///
/// This is the only buffering operator: it drains the input on first pull.
/// Never use it on unbounded inputs.
pub fn naive_order(input: Results, orders: Vec<Order>) -> Results {
    let query = input.query().clone();
    Results::new(
        query,
        OrderSource {
            input,
            orders,
            buffered: None,
        },
    )
}

/// Apply every part of `query` naively, in the fixed order
/// prefix, filters, orders, offset, limit
pub fn naive_query_apply(query: &Query, mut results: Results) -> Results {
    if !query.prefix.is_root() {
        let prefix = format!("{}/", query.prefix);
        results = naive_filter(results, Filter::key_prefix(prefix));
    }
    for filter in &query.filters {
        results = naive_filter(results, filter.clone());
    }
    if !query.orders.is_empty() {
        results = naive_order(results, query.orders.clone());
    }
    if query.offset > 0 {
        results = naive_offset(results, query.offset);
    }
    if query.limit > 0 {
        results = naive_limit(results, query.limit);
    }
    results
}
