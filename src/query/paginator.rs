use serde::Serialize;

/// One page of results with the total it was cut from
///
/// Computed once by `paginate`; the fields never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator<T> {
    items: T,
    total: u64,
    per_page: u64,
    current_page: u64,
}

impl<T> Paginator<T> {
    pub(crate) fn new(items: T, total: u64, per_page: u64, current_page: u64) -> Self {
        Self {
            items,
            total,
            per_page,
            current_page,
        }
    }

    pub fn items(&self) -> &T {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut T {
        &mut self.items
    }

    pub fn into_items(self) -> T {
        self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    /// Number of the last page, 1 for an empty result
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    /// Transform the items, keeping the counts
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Paginator<U> {
        Paginator {
            items: f(self.items),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
        }
    }
}
