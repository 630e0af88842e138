pub mod paging;
pub mod retry;
pub mod types;

pub use paging::{Page, PagedLister};
pub use retry::{PollSchedule, poll_until};
