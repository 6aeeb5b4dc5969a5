//! Shared page bookkeeping for every stream of one read response.
//!
//! A read response is one sequence of pages, each row carrying values for
//! many streams. Every stream instantiation walks that sequence with its own
//! read pointer. The manager fetches pages when a pointer runs past the last
//! known one, evicts pages nobody is reading once more than
//! [`PaginationConfig::max_pages`] are in memory, and fetches evicted pages
//! again when a pointer lands on them.
//!
//! Pages are assumed to have the size of the first page, so an offset maps
//! to `(offset / page_size, offset % page_size)`.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::page::PageStore;
use crate::types::{ContinuationToken, PageData, Row};

/// Identifies one act of iterating a stream.
///
/// Two instantiations of the same logical stream get different ids and
/// advance independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wrap a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Clone, Copy, Debug)]
struct ReadPointer {
    /// Offset of the next row to read.
    offset: usize,
    /// Page the last read landed on.
    page: usize,
}

/// Which instantiations currently sit on each page.
///
/// Entries are only created by [`insert`](Self::insert); lookups never add
/// empty sets.
#[derive(Debug, Default)]
pub struct ActivePointers {
    readers: HashMap<usize, BTreeSet<InstanceId>>,
}

impl ActivePointers {
    /// Mark `instance` as reading `page`.
    pub fn insert(&mut self, page: usize, instance: InstanceId) {
        self.readers.entry(page).or_default().insert(instance);
    }

    /// Remove `instance` from `page`.
    pub fn remove(&mut self, page: usize, instance: InstanceId) {
        if let Some(set) = self.readers.get_mut(&page) {
            set.remove(&instance);
            if set.is_empty() {
                self.readers.remove(&page);
            }
        }
    }

    /// Returns true if nobody reads `page`.
    pub fn is_idle(&self, page: usize) -> bool {
        self.readers.get(&page).is_none_or(BTreeSet::is_empty)
    }

    /// Number of instantiations on `page`.
    pub fn readers(&self, page: usize) -> usize {
        self.readers.get(&page).map_or(0, BTreeSet::len)
    }

    /// Returns true if `instance` is registered on `page`.
    pub fn contains(&self, page: usize, instance: InstanceId) -> bool {
        self.readers.get(&page).is_some_and(|set| set.contains(&instance))
    }
}

/// Page cache and read pointers behind a multi-stream read cursor.
pub struct PaginationManager<F> {
    store: PageStore,
    materialized: usize,
    pointers: HashMap<InstanceId, ReadPointer>,
    active: ActivePointers,
    page_size: usize,
    next_token: Option<ContinuationToken>,
    exhausted: bool,
    config: PaginationConfig,
    fetcher: F,
}

impl<F: PageFetcher> PaginationManager<F> {
    /// Seed the manager with the first page of a response.
    ///
    /// `origin` is the token that produces `first` again. Without it the
    /// first page can never be evicted.
    pub fn new(
        first: PageData,
        origin: Option<ContinuationToken>,
        fetcher: F,
        config: PaginationConfig,
    ) -> Self {
        let page_size = first.data.len();
        let next_token = first.next_page.map(|n| n.next_query);
        let mut store = PageStore::new();
        store.push(first.data, origin);

        Self {
            store,
            materialized: 1,
            pointers: HashMap::new(),
            active: ActivePointers::default(),
            page_size,
            exhausted: page_size == 0,
            next_token,
            config,
            fetcher,
        }
    }

    /// Rows per page, taken from the first page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages currently holding rows.
    pub fn materialized(&self) -> usize {
        self.materialized
    }

    /// All known pages.
    pub fn store(&self) -> &PageStore {
        &self.store
    }

    /// Reader index by page.
    pub fn active(&self) -> &ActivePointers {
        &self.active
    }

    /// Budget in effect.
    pub fn config(&self) -> PaginationConfig {
        self.config
    }

    /// Offset of the next row `instance` will read, if it has started.
    pub fn offset(&self, instance: InstanceId) -> Option<usize> {
        self.pointers.get(&instance).map(|p| p.offset)
    }

    /// Returns true once the server reported no further pages.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advance `instance` by one row and return that row.
    ///
    /// Returns `Ok(None)` once the response is exhausted. The pointer
    /// advances even when a fetch fails; the error is returned unchanged.
    ///
    /// Every page but the last must hold exactly `page_size` rows. A page
    /// that runs short before the end, or any page holding more, fails with
    /// [`Error::Parse`].
    pub async fn next(&mut self, instance: InstanceId) -> Result<Option<&Row>> {
        if self.page_size == 0 {
            return Ok(None);
        }

        let offset = self.advance(instance);
        let page_number = offset / self.page_size;
        let item = offset % self.page_size;
        self.move_pointer(instance, page_number);

        while page_number >= self.store.len() {
            if !self.fetch_next().await? {
                return Ok(None);
            }
            self.garbage_collect();
        }

        let Some(page) = self.store.get_mut(page_number) else {
            return Ok(None);
        };
        if !page.is_active() {
            page.reconstruct(&self.fetcher).await?;
            let rows = page.payload().map_or(0, <[Row]>::len);
            if rows > self.page_size {
                page.evict()?;
                return Err(page_size_error(page_number, rows, self.page_size));
            }
            self.materialized += 1;
            self.garbage_collect();
        }

        let rows = self
            .store
            .get(page_number)
            .and_then(|page| page.payload())
            .map_or(0, <[Row]>::len);
        if item >= rows {
            // Only the final page may run short.
            if page_number + 1 < self.store.len() || self.fetch_next().await? {
                self.garbage_collect();
                return Err(page_size_error(page_number, rows, self.page_size));
            }
            return Ok(None);
        }

        Ok(self
            .store
            .get(page_number)
            .and_then(|page| page.payload())
            .and_then(|rows| rows.get(item)))
    }

    /// Return the current offset of `instance` and store the following one.
    fn advance(&mut self, instance: InstanceId) -> usize {
        match self.pointers.get_mut(&instance) {
            Some(pointer) => {
                let offset = pointer.offset;
                pointer.offset += 1;
                offset
            }
            None => {
                self.pointers.insert(instance, ReadPointer { offset: 1, page: 0 });
                self.active.insert(0, instance);
                0
            }
        }
    }

    fn move_pointer(&mut self, instance: InstanceId, page_number: usize) {
        let Some(pointer) = self.pointers.get_mut(&instance) else {
            return;
        };
        if pointer.page != page_number {
            trace!(?instance, from = pointer.page, to = page_number, "pointer moved");
            self.active.remove(pointer.page, instance);
            self.active.insert(page_number, instance);
            pointer.page = page_number;
        }
    }

    /// Fetch the page after the last known one.
    ///
    /// Returns `Ok(false)` when there is none. The token is kept on failure
    /// so the next call retries the same page.
    async fn fetch_next(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let Some(token) = self.next_token.take() else {
            debug!(pages = self.store.len(), "read exhausted");
            self.exhausted = true;
            return Ok(false);
        };

        let data = match self.fetcher.fetch_page(&token).await {
            Ok(data) => data,
            Err(e) => {
                self.next_token = Some(token);
                return Err(e);
            }
        };
        if data.data.is_empty() {
            debug!(pages = self.store.len(), "read exhausted on empty page");
            self.exhausted = true;
            return Ok(false);
        }
        if data.data.len() > self.page_size {
            let number = self.store.len();
            self.next_token = Some(token);
            return Err(page_size_error(number, data.data.len(), self.page_size));
        }

        self.next_token = data.next_page.map(|n| n.next_query);
        let rows = data.data.len();
        let number = self.store.push(data.data, Some(token));
        self.materialized += 1;
        debug!(page = number, rows, materialized = self.materialized, "fetched page");
        Ok(true)
    }

    /// Evict idle collectible pages, lowest first, until back under budget.
    ///
    /// At most `gc_sweeps` passes are made, so the budget is a soft cap when
    /// readers pin more pages than it allows. Returns the number evicted.
    fn garbage_collect(&mut self) -> usize {
        let mut to_collect = self.materialized.saturating_sub(self.config.max_pages);
        let mut evicted = 0;

        for _ in 0..self.config.gc_sweeps {
            if to_collect == 0 {
                break;
            }
            for page in self.store.iter_mut() {
                if to_collect == 0 {
                    break;
                }
                if !page.is_active() || !self.active.is_idle(page.number()) {
                    continue;
                }
                if page.evict().is_ok() {
                    self.materialized -= 1;
                    to_collect -= 1;
                    evicted += 1;
                }
            }
        }

        if to_collect > 0 {
            debug!(
                over_budget = to_collect,
                materialized = self.materialized,
                "pages pinned by readers, budget exceeded"
            );
        }
        evicted
    }
}

fn page_size_error(page: usize, rows: usize, page_size: usize) -> Error {
    Error::Parse {
        message: format!("page {} has {} rows, expected {}", page, rows, page_size),
    }
}
