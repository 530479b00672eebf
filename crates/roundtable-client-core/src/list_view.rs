use std::cell::RefCell;

use async_trait::async_trait;
use roundtable_domain::{FilterState, Page};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The scoped list query as seen from the client. Implementations carry the
/// session; the controller only supplies the filter.
#[async_trait(?Send)]
pub trait ListTransport {
    type Item: Clone;

    async fn fetch_page(&self, filter: &FilterState) -> Result<Page<Self::Item>, TransportError>;
}

/// Mutually exclusive view states exposed to the rendering layer. `Empty` is
/// the distinguished onboarding state: a successful result with nothing owned
/// and no search narrowing the list. An empty page *with* a search active is
/// `Ready`, so the rendering layer shows "no matches" instead of onboarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState<T> {
    Loading,
    Failed(String),
    Empty,
    Ready(Page<T>),
}

struct ControllerInner<T> {
    state: ViewState<T>,
    seq: u64,
}

pub struct ListViewController<T: ListTransport> {
    transport: T,
    inner: RefCell<ControllerInner<T::Item>>,
    subscribers: RefCell<Vec<Box<dyn Fn(&ViewState<T::Item>)>>>,
}

impl<T: ListTransport> ListViewController<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            inner: RefCell::new(ControllerInner {
                state: ViewState::Loading,
                seq: 0,
            }),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn state(&self) -> ViewState<T::Item> {
        self.inner.borrow().state.clone()
    }

    pub fn subscribe(&self, subscriber: impl Fn(&ViewState<T::Item>) + 'static) {
        self.subscribers.borrow_mut().push(Box::new(subscriber));
    }

    /// Issues the scoped query for `filter`. Last request wins: a refresh
    /// started later supersedes this one, and a superseded response is
    /// discarded without touching state. The idempotent read is retried once
    /// before surfacing a failure.
    pub async fn refresh(&self, filter: &FilterState) {
        let seq = {
            let mut inner = self.inner.borrow_mut();
            inner.seq += 1;
            inner.state = ViewState::Loading;
            inner.seq
        };
        self.notify();

        let mut result = self.transport.fetch_page(filter).await;
        if result.is_err() && self.current_seq() == seq {
            result = self.transport.fetch_page(filter).await;
        }

        {
            let mut inner = self.inner.borrow_mut();
            if inner.seq != seq {
                return;
            }
            inner.state = match result {
                Ok(page) if page.total == 0 && !filter.has_search() => ViewState::Empty,
                Ok(page) => ViewState::Ready(page),
                Err(error) => ViewState::Failed(error.message),
            };
        }
        self.notify();
    }

    fn current_seq(&self) -> u64 {
        self.inner.borrow().seq
    }

    fn notify(&self) {
        let state = self.state();
        for subscriber in self.subscribers.borrow().iter() {
            subscriber(&state);
        }
    }
}
