pub mod filter;
pub mod page;
pub mod predicate;
pub mod records;

pub use filter::FilterState;
pub use page::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, Page};
pub use predicate::{Clause, Predicate};
pub use records::{
    AgentPatch, AgentRecord, MeetingPatch, MeetingRecord, MeetingStatus, MeetingView, OwnedRecord,
    Principal, newest_first,
};
