//! Fetch loop over offset- or cursor-paginated endpoints.
//!
//! The paginator only sequences successful pages. A failing fetch is yielded
//! once as an `Err` and ends the iteration; retrying is the transport's job.

use std::collections::VecDeque;

use crate::error::SyncResult;

/// One page of results plus the cursor for the next one, if the server sent it
#[derive(Debug, Clone)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn new(items: Vec<T>, next: Option<C>) -> Self {
        Self { items, next }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Lazily yields every item across pages until a terminal page is seen.
///
/// A page is terminal when it has no `next` cursor, or, when a full page size
/// is set, when it holds fewer items than that size. An empty first page is a
/// valid empty result.
pub struct ConvergingPaginator<T, C, F>
where
    F: FnMut(&C) -> SyncResult<Page<T, C>>,
{
    fetch: F,
    cursor: Option<C>,
    full_page_size: Option<usize>,
    buffer: VecDeque<T>,
    fetches: usize,
    done: bool,
}

impl<T, C, F> ConvergingPaginator<T, C, F>
where
    F: FnMut(&C) -> SyncResult<Page<T, C>>,
{
    /// Cursor-style pagination: stops when a page has no `next` cursor.
    pub fn cursor(start: C, fetch: F) -> Self {
        Self {
            fetch,
            cursor: Some(start),
            full_page_size: None,
            buffer: VecDeque::new(),
            fetches: 0,
            done: false,
        }
    }

    /// Offset-style pagination: additionally stops on the first short page.
    pub fn offset(start: C, full_page_size: usize, fetch: F) -> Self {
        Self {
            full_page_size: Some(full_page_size),
            ..Self::cursor(start, fetch)
        }
    }

    /// Number of page fetches performed so far
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    fn fetch_next_page(&mut self) -> Option<SyncResult<()>> {
        let cursor = self.cursor.take()?;
        self.fetches += 1;
        match (self.fetch)(&cursor) {
            Ok(page) => {
                let short = self
                    .full_page_size
                    .is_some_and(|size| page.items.len() < size);
                if short {
                    log::debug!(
                        "Page {} returned {} items, fewer than a full page, stopping",
                        self.fetches,
                        page.items.len()
                    );
                } else {
                    self.cursor = page.next;
                }
                self.buffer.extend(page.items);
                Some(Ok(()))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<T, C, F> Iterator for ConvergingPaginator<T, C, F>
where
    F: FnMut(&C) -> SyncResult<Page<T, C>>,
{
    type Item = SyncResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            match self.fetch_next_page() {
                Some(Ok(())) => continue,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}
