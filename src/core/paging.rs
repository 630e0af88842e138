use std::future::Future;

use log::debug;

use crate::error::Result;

/// One page of a provider listing.
///
/// Adapters fold the provider's truncation flag into `next`: a page that is
/// not truncated carries no cursor, whatever marker the provider echoed back.
#[derive(Debug, Clone)]
pub struct Page<T, C = String> {
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

    /// Builds a page from a truncation flag plus marker pair.
    pub fn from_truncated(items: Vec<T>, is_truncated: bool, next: Option<C>) -> Self {
        Self {
            items,
            next: if is_truncated { next } else { None },
        }
    }
}

/// Cursor-following enumeration over a provider collection.
///
/// Pages are fetched strictly in sequence. Any page failure aborts the walk
/// and the items gathered so far are dropped.
pub struct PagedLister<F> {
    resource: &'static str,
    fetch: F,
}

impl<F> PagedLister<F> {
    pub fn new(resource: &'static str, fetch: F) -> Self {
        Self { resource, fetch }
    }

    pub async fn collect_all<T, C, Fut>(mut self) -> Result<Vec<T>>
    where
        F: FnMut(Option<C>) -> Fut,
        Fut: Future<Output = Result<Page<T, C>>>,
    {
        let mut items = Vec::new();
        let mut cursor = None;
        let mut pages = 0usize;
        loop {
            let page = (self.fetch)(cursor.take()).await?;
            pages += 1;
            items.extend(page.items);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(
            "[paging] listed {} {} item(s) over {} page(s)",
            items.len(),
            self.resource,
            pages
        );
        Ok(items)
    }

    /// Returns the first item matching `predicate` in provider order, stopping
    /// as soon as it is seen.
    pub async fn find_first<T, C, Fut, P>(mut self, mut predicate: P) -> Result<Option<T>>
    where
        F: FnMut(Option<C>) -> Fut,
        Fut: Future<Output = Result<Page<T, C>>>,
        P: FnMut(&T) -> bool,
    {
        let mut cursor = None;
        loop {
            let page = (self.fetch)(cursor.take()).await?;
            if let Some(found) = page.items.into_iter().find(|item| predicate(item)) {
                return Ok(Some(found));
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => {
                    debug!("[paging] no matching {} item", self.resource);
                    return Ok(None);
                }
            }
        }
    }
}
