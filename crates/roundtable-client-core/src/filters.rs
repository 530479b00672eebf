//! Observable filter state, kept in lockstep with the navigable URL. The URL
//! is the source of truth: committed changes are written back through a
//! [`HistorySink`] and browser navigation flows in via [`FilterStore::sync_from_query`].

use std::cell::RefCell;

use roundtable_domain::FilterState;

/// Where encoded filter state is published. Encoding always *replaces* the
/// current history entry; pushing would pollute back-navigation with an entry
/// per keystroke.
pub trait HistorySink {
    fn replace_query(&self, query: &str);
}

type FilterSubscriber = Box<dyn Fn(&FilterState)>;

pub struct FilterStore<H: HistorySink> {
    sink: H,
    state: RefCell<FilterState>,
    subscribers: RefCell<Vec<FilterSubscriber>>,
}

impl<H: HistorySink> FilterStore<H> {
    #[must_use]
    pub fn new(sink: H) -> Self {
        Self {
            sink,
            state: RefCell::new(FilterState::default()),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Restores state from the URL the view mounted on.
    #[must_use]
    pub fn with_initial_query(sink: H, query: &str) -> Self {
        let store = Self::new(sink);
        *store.state.borrow_mut() = FilterState::from_query(query);
        store
    }

    #[must_use]
    pub fn state(&self) -> FilterState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self, subscriber: impl Fn(&FilterState) + 'static) {
        self.subscribers.borrow_mut().push(Box::new(subscriber));
    }

    /// Updates the search term; the page resets to 1 because the previous
    /// page position is meaningless against a narrowed result set.
    pub fn set_search(&self, search: &str) {
        let next = self.state.borrow().with_search(search);
        self.commit(next, true);
    }

    /// Updates only the page, preserving the active search.
    pub fn set_page(&self, page: u64) {
        let next = self.state.borrow().with_page(page);
        self.commit(next, true);
    }

    pub fn apply(&self, next: FilterState) {
        self.commit(next, true);
    }

    /// Ingests a query string the browser already navigated to (reload,
    /// back/forward). Subscribers are notified but nothing is written back
    /// to the sink; the URL is already in the new state.
    pub fn sync_from_query(&self, query: &str) {
        self.commit(FilterState::from_query(query), false);
    }

    fn commit(&self, next: FilterState, write_sink: bool) {
        {
            let mut state = self.state.borrow_mut();
            if *state == next {
                return;
            }
            *state = next.clone();
        }
        if write_sink {
            self.sink.replace_query(&next.to_query());
        }
        for subscriber in self.subscribers.borrow().iter() {
            subscriber(&next);
        }
    }
}
