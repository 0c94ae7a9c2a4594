//! Lazy, forward-only result sequences
//!
//! Rows are pulled from the backend in bounded batches as the caller
//! iterates. A batch is fetched with its own short-lived statement, so no
//! cursor stays open between `next()` calls: dropping the iterator early
//! releases nothing because nothing is held, and other operations on the
//! same store may run while a sequence is only partly consumed.

use std::collections::VecDeque;

use crate::error::Result;

/// A boxed sequence of backend rows.
pub type RecordIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + Send + 'a>;

/// Where the next batch starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Page<K> {
    /// First batch: skip this many rows from the start of the ordering.
    Skip(u64),
    /// Later batches: rows strictly after this sort key.
    After(K),
}

/// Iterator that fetches batches on demand, continuing from the sort key of
/// the last row it yielded.
///
/// Rows inserted or deleted ahead of the key between batches therefore
/// cannot shift the window: a row is never yielded twice and a row that
/// is still present is never skipped.
pub struct Paged<T, K, F, G> {
    fetch: F,
    key: G,
    buffer: VecDeque<T>,
    page: Page<K>,
    remaining: u64,
    batch_size: u64,
    exhausted: bool,
}

impl<T, K, F, G> Paged<T, K, F, G>
where
    F: FnMut(&Page<K>, u64) -> Result<Vec<T>>,
    G: Fn(&T) -> K,
{
    /// Start after `skip` rows, yielding at most `limit` rows in total.
    /// `key` extracts the ordering key used to resume after a row.
    pub fn new(fetch: F, key: G, skip: u64, limit: u64, batch_size: u64) -> Self {
        Self {
            fetch,
            key,
            buffer: VecDeque::new(),
            page: Page::Skip(skip),
            remaining: limit,
            batch_size: batch_size.max(1),
            exhausted: limit == 0,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let limit = self.batch_size.min(self.remaining);
        let rows = (self.fetch)(&self.page, limit)?;
        let fetched = rows.len() as u64;

        // A short page means the backend has nothing further.
        if fetched < limit {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.page = Page::After((self.key)(last));
        }
        self.remaining = self.remaining.saturating_sub(fetched);
        if self.remaining == 0 {
            self.exhausted = true;
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl<T, K, F, G> Iterator for Paged<T, K, F, G>
where
    F: FnMut(&Page<K>, u64) -> Result<Vec<T>>,
    G: Fn(&T) -> K,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.exhausted {
            return None;
        }
        if let Err(e) = self.refill() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Convert a row count to a SQL `LIMIT`/`OFFSET` operand.
pub(crate) fn sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Sorted integers standing in for a table keyed by value.
    fn source(rows: Vec<u64>) -> impl FnMut(&Page<u64>, u64) -> Result<Vec<u64>> {
        move |page, limit| {
            let rest: Vec<u64> = match page {
                Page::Skip(n) => rows.iter().copied().skip(*n as usize).collect(),
                Page::After(k) => rows.iter().copied().filter(|r| r > k).collect(),
            };
            Ok(rest.into_iter().take(limit as usize).collect())
        }
    }

    fn identity(row: &u64) -> u64 {
        *row
    }

    #[test]
    fn test_yields_window() {
        let rows: Vec<u64> = Paged::new(source((0..10).collect()), identity, 2, 5, 2)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_stops_at_end_of_source() {
        let rows: Vec<u64> = Paged::new(source((0..7).collect()), identity, 0, u64::MAX, 3)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_resumes_from_last_key() {
        let mut pages = Vec::new();
        let paged = Paged::new(
            |page: &Page<u64>, limit| {
                pages.push(page.clone());
                let start = match page {
                    Page::Skip(n) => *n,
                    Page::After(k) => k + 1,
                };
                Ok((start..20).take(limit as usize).collect::<Vec<u64>>())
            },
            identity,
            3,
            7,
            3,
        );
        let rows: Vec<u64> = paged.collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(pages, vec![Page::Skip(3), Page::After(5), Page::After(8)]);
    }

    #[test]
    fn test_fetches_lazily() {
        let mut calls = 0;
        let mut paged = Paged::new(
            |page: &Page<u64>, limit| {
                calls += 1;
                let start = match page {
                    Page::Skip(n) => *n,
                    Page::After(k) => k + 1,
                };
                Ok((start..start + limit).collect::<Vec<u64>>())
            },
            identity,
            0,
            100,
            10,
        );
        assert_eq!(paged.next().unwrap().unwrap(), 0);
        assert_eq!(paged.nth(9).unwrap().unwrap(), 10);
        drop(paged);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_zero_limit_never_fetches() {
        let mut paged = Paged::new(
            |_: &Page<u64>, _| -> Result<Vec<u64>> { panic!("should not fetch") },
            identity,
            0,
            0,
            10,
        );
        assert!(paged.next().is_none());
    }

    #[test]
    fn test_error_ends_sequence() {
        let mut paged = Paged::new(
            |_: &Page<u64>, _| -> Result<Vec<u64>> { Err(Error::Config("boom".to_string())) },
            identity,
            0,
            10,
            10,
        );
        assert!(paged.next().unwrap().is_err());
        assert!(paged.next().is_none());
    }
}
