use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MIN_PAGE_SIZE: u64 = 1;
pub const MAX_PAGE_SIZE: u64 = 100;

/// One page of an owner-scoped list. `items` and `total` are always computed
/// from the same predicate, so the metadata cannot drift from the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            total_pages: 0,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[must_use]
pub fn clamp_page_size(requested: u64) -> u64 {
    requested.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

#[must_use]
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size.max(MIN_PAGE_SIZE))
}

#[must_use]
pub fn page_offset(page: u64, page_size: u64) -> u64 {
    page.max(DEFAULT_PAGE)
        .saturating_sub(1)
        .saturating_mul(page_size)
}
