pub mod retry;

pub use retry::{
    RetryBudget, RetryPolicy, DEFAULT_MAX_RATE_LIMIT_RETRIES, DEFAULT_MAX_RATE_LIMIT_WAIT_SECS,
};
