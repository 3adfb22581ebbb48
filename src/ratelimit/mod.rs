//! Rate limiting logic.

mod limiter;
mod procedure;

pub use limiter::{
    effective_window_secs, Decision, RateLimiter, DEFAULT_TIMEOUT, DEFAULT_WINDOW_SECS,
    MAX_LIMIT, MAX_WINDOW_SECS,
};
pub use procedure::Procedure;
