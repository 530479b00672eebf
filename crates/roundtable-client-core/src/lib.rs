pub mod filters;
pub mod list_view;

pub use filters::{FilterStore, HistorySink};
pub use list_view::{ListTransport, ListViewController, TransportError, ViewState};
