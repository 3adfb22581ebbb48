//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{CounterStore, ScriptArg, ScriptReply, StoreError};
use crate::ratelimit::Procedure;

/// A counter store that lives in the current process.
///
/// It runs the sliding-window procedure natively instead of interpreting the
/// procedure source, holding the key's shard lock for the whole evaluation.
/// Only useful when a single process owns the limits, and in tests.
#[derive(Debug, Default)]
pub struct LocalStore {
    /// Request timestamps by key
    records: DashMap<String, Vec<u64>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently recorded for `key`.
    pub fn recorded(&self, key: &str) -> usize {
        self.records.get(key).map(|r| r.len()).unwrap_or(0)
    }

    /// Number of keys holding a record.
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[async_trait]
impl CounterStore for LocalStore {
    async fn evaluate(
        &self,
        _procedure: &Procedure,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<ScriptReply, StoreError> {
        let key = keys
            .first()
            .ok_or_else(|| StoreError::Rejected("procedure expects one key".to_string()))?;
        let now = int_arg(args, 0, "now")?;
        let window = int_arg(args, 1, "window")?;
        let limit = int_arg(args, 2, "limit")?;

        // Pruning stands in for the Redis key expiry: once every stamp is
        // older than the window start the record is empty and removed.
        let reply = {
            let mut stamps = self.records.entry(key.clone()).or_default();
            let window_start = now.saturating_sub(window);
            stamps.retain(|&ts| ts >= window_start);
            let count = stamps.len() as u64;

            if count >= limit {
                0
            } else {
                stamps.push(now);
                i64::try_from(limit - count).unwrap_or(i64::MAX)
            }
        };

        self.records.remove_if(key, |_, stamps| stamps.is_empty());
        trace!(key = %key, reply = reply, "Local procedure evaluated");
        Ok(ScriptReply::Integer(reply))
    }
}

fn int_arg(args: &[ScriptArg], index: usize, name: &str) -> Result<u64, StoreError> {
    match args.get(index) {
        Some(ScriptArg::Int(v)) => Ok(*v),
        Some(ScriptArg::Str(s)) => s
            .parse()
            .map_err(|_| StoreError::Rejected(format!("argument {} is not a number: {}", name, s))),
        None => Err(StoreError::Rejected(format!("missing argument {}", name))),
    }
}
