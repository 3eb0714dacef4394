pub mod retry;
pub mod test_utils;

pub use retry::{Backoff, RetryPolicy};
