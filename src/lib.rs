//! Redlimit - Distributed Sliding-Window Rate Limiting
//!
//! This crate decides per key whether a request may proceed, with every
//! process instance sharing one view of consumption through a shared
//! counter store. The check and the increment run as a single atomic
//! procedure inside the store, so concurrent callers never over-admit.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{RedlimitError, Result};
pub use ratelimit::{Decision, Procedure, RateLimiter};
pub use store::{CounterStore, LocalStore, RedisStore};
