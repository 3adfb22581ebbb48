//! Core rate limiter implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, trace, warn};

use super::procedure::Procedure;
use crate::config::LimiterConfig;
use crate::error::{RedlimitError, Result};
use crate::store::{CounterStore, ScriptArg, ScriptReply, StoreError};

/// Window used when none (or zero) is configured.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Upper bound on a single store round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);
/// Largest window accepted. Keeps `now - window` and the key TTL exact in
/// Lua numbers and within the range Redis accepts for `EXPIRE`.
pub const MAX_WINDOW_SECS: u64 = 1 << 32;
/// Largest limit passed to the store, the largest integer a Lua number
/// holds exactly. Larger limits behave as unlimited.
pub const MAX_LIMIT: u64 = 1 << 53;

/// The window actually used for a configured `window_secs`.
///
/// Zero falls back to [`DEFAULT_WINDOW_SECS`]; anything above
/// [`MAX_WINDOW_SECS`] is clamped.
pub fn effective_window_secs(window_secs: u64) -> u64 {
    match window_secs {
        0 => DEFAULT_WINDOW_SECS,
        w => w.min(MAX_WINDOW_SECS),
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was recorded and may proceed.
    Allowed {
        /// Requests still available in the current window.
        remaining: u64,
    },
    /// No capacity was left; nothing was recorded.
    Breached,
}

impl Decision {
    pub fn is_breached(&self) -> bool {
        matches!(self, Decision::Breached)
    }

    /// Remaining capacity, zero when breached.
    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Allowed { remaining } => *remaining,
            Decision::Breached => 0,
        }
    }
}

/// The rate limiter that decides per key whether a request may proceed.
///
/// All counter state lives in the store. The limiter only holds immutable
/// configuration, so it can be shared across any number of tasks without
/// locking.
pub struct RateLimiter {
    /// Window size in seconds, shared by all keys
    window_secs: u64,
    /// Requests allowed per window, by key
    limits: HashMap<String, u64>,
    /// Prepended to every key before it reaches the store
    key_prefix: String,
    procedure: Procedure,
    store: Arc<dyn CounterStore>,
    timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window_secs", &self.window_secs)
            .field("limits", &self.limits)
            .field("key_prefix", &self.key_prefix)
            .field("procedure", &self.procedure)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RateLimiter {
    /// Create a rate limiter using the embedded sliding-window procedure.
    ///
    /// A `window_secs` of zero falls back to [`DEFAULT_WINDOW_SECS`].
    pub fn new(
        window_secs: u64,
        limits: HashMap<String, u64>,
        store: Arc<dyn CounterStore>,
    ) -> Self {
        Self::with_procedure(window_secs, limits, store, Procedure::embedded())
    }

    /// Create a rate limiter running a specific procedure.
    ///
    /// Windows and limits beyond what the store represents exactly are
    /// clamped to [`MAX_WINDOW_SECS`] and [`MAX_LIMIT`].
    pub fn with_procedure(
        window_secs: u64,
        mut limits: HashMap<String, u64>,
        store: Arc<dyn CounterStore>,
        procedure: Procedure,
    ) -> Self {
        if window_secs > MAX_WINDOW_SECS {
            warn!(window_secs = window_secs, max = MAX_WINDOW_SECS, "Window clamped");
        }
        let window_secs = effective_window_secs(window_secs);
        for (key, limit) in limits.iter_mut() {
            if *limit > MAX_LIMIT {
                debug!(key = %key, limit = *limit, "Limit clamped to store maximum");
                *limit = MAX_LIMIT;
            }
        }
        Self {
            window_secs,
            limits,
            key_prefix: String::new(),
            procedure,
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a rate limiter from configuration.
    ///
    /// Fails when a configured procedure file cannot be loaded.
    pub fn from_config(
        config: &LimiterConfig,
        key_prefix: &str,
        timeout: Duration,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self> {
        let procedure = match &config.script_path {
            Some(path) => Procedure::from_file(path)?,
            None => Procedure::embedded(),
        };
        Ok(
            Self::with_procedure(config.window_secs, config.limits.clone(), store, procedure)
                .with_key_prefix(key_prefix)
                .with_timeout(timeout),
        )
    }

    /// Set the namespace prepended to counter keys.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the upper bound on a store round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the procedure into the store ahead of the first check.
    pub async fn prepare(&self) -> Result<()> {
        self.store.prepare(&self.procedure).await?;
        debug!(sha = %self.procedure.sha(), "Rate limit procedure prepared");
        Ok(())
    }

    /// Check and record a request for `key` at the current time.
    pub async fn check(&self, key: &str) -> Result<Decision> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.check_at(key, now).await
    }

    /// Check and record a request for `key` as if it arrived at `now`
    /// (Unix seconds).
    pub async fn check_at(&self, key: &str, now: u64) -> Result<Decision> {
        let limit = self.limit_for(key);
        let store_key = format!("{}{}", self.key_prefix, key);

        trace!(
            key = %key,
            limit = limit,
            now = now,
            "Checking rate limit"
        );

        let keys = [store_key];
        let args = [
            ScriptArg::Int(now),
            ScriptArg::Int(self.window_secs),
            ScriptArg::Int(limit),
            ScriptArg::Str(uuid::Uuid::new_v4().to_string()),
        ];

        let reply = tokio::time::timeout(
            self.timeout,
            self.store.evaluate(&self.procedure, &keys, &args),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.timeout))
        .and_then(|r| r)
        .map_err(|e| {
            warn!(key = %key, error = %e, "Rate limit check failed");
            RedlimitError::Store(e)
        })?;

        let decision = interpret(&reply).map_err(|e| {
            error!(key = %key, reply = %reply, "Counter store returned an unexpected reply");
            e
        })?;

        if decision.is_breached() {
            debug!(key = %key, limit = limit, "Rate limit exceeded");
        } else {
            trace!(key = %key, remaining = decision.remaining(), "Request allowed");
        }
        Ok(decision)
    }

    /// The limit configured for `key`; unconfigured keys get zero.
    pub fn limit_for(&self, key: &str) -> u64 {
        self.limits.get(key).copied().unwrap_or(0)
    }

    /// The window size in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn limits(&self) -> &HashMap<String, u64> {
        &self.limits
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }
}

/// Translate the procedure reply into a decision.
///
/// Zero means breached; a positive reply is remaining capacity plus one.
fn interpret(reply: &ScriptReply) -> Result<Decision> {
    match reply {
        ScriptReply::Integer(0) => Ok(Decision::Breached),
        ScriptReply::Integer(n) if *n > 0 => Ok(Decision::Allowed {
            remaining: (*n - 1) as u64,
        }),
        other => Err(RedlimitError::ProtocolMismatch(format!(
            "expected a non-negative integer, got {}",
            other
        ))),
    }
}
