//! Shared counter store abstraction.
//!
//! The rate limiter never touches counter state directly. Everything goes
//! through a single atomic operation: evaluate a procedure against a key
//! with a list of arguments, executed by the store without interleaving.

mod local;
mod redis_store;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ratelimit::Procedure;

pub use self::local::LocalStore;
pub use self::redis_store::RedisStore;

/// Errors that can occur while talking to a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("store rejected the procedure: {0}")]
    Rejected(String),
    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// True when the store could not be reached or did not answer in time.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// An argument passed to a store procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptArg {
    Int(u64),
    Str(String),
}

impl From<u64> for ScriptArg {
    fn from(value: u64) -> Self {
        ScriptArg::Int(value)
    }
}

impl From<String> for ScriptArg {
    fn from(value: String) -> Self {
        ScriptArg::Str(value)
    }
}

impl fmt::Display for ScriptArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptArg::Int(v) => write!(f, "{}", v),
            ScriptArg::Str(s) => write!(f, "{}", s),
        }
    }
}

/// The raw reply of a procedure, before the limiter interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    Integer(i64),
    Nil,
    Bytes(Vec<u8>),
    /// Any other reply shape, rendered for diagnostics.
    Other(String),
}

impl fmt::Display for ScriptReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptReply::Integer(v) => write!(f, "integer {}", v),
            ScriptReply::Nil => write!(f, "nil"),
            ScriptReply::Bytes(b) => write!(f, "bulk string {:?}", String::from_utf8_lossy(b)),
            ScriptReply::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A store capable of running a procedure atomically against a key.
///
/// Implementations must guarantee that no two evaluations touching the same
/// key interleave.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Evaluate `procedure` against `keys` with `args` as one atomic unit.
    async fn evaluate(
        &self,
        procedure: &Procedure,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<ScriptReply, StoreError>;

    /// Make the procedure available ahead of the first evaluation.
    ///
    /// Stores that compile procedures report syntax errors here.
    async fn prepare(&self, _procedure: &Procedure) -> Result<(), StoreError> {
        Ok(())
    }
}
