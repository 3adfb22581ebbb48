//! The check-and-increment procedure executed inside the counter store.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::{RedlimitError, Result};

const EMBEDDED_SOURCE: &str = include_str!("sliding_window.lua");

/// A loaded, validated procedure ready to be handed to a store.
///
/// The source is read once; cloning shares it.
#[derive(Clone)]
pub struct Procedure {
    source: Arc<str>,
    script: Arc<redis::Script>,
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("sha", &self.sha())
            .field("len", &self.source.len())
            .finish()
    }
}

impl Procedure {
    /// The sliding-window procedure compiled into the binary.
    pub fn embedded() -> Self {
        Self::build(EMBEDDED_SOURCE)
    }

    /// Build a procedure from source text.
    pub fn from_source(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(RedlimitError::ScriptLoad {
                path: "<inline>".to_string(),
                reason: "procedure source is empty".to_string(),
            });
        }
        Ok(Self::build(source))
    }

    /// Load a procedure from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| RedlimitError::ScriptLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if source.trim().is_empty() {
            return Err(RedlimitError::ScriptLoad {
                path: path.display().to_string(),
                reason: "file is empty".to_string(),
            });
        }

        let procedure = Self::build(&source);
        info!(path = %path.display(), sha = %procedure.sha(), "Loaded rate limit procedure");
        Ok(procedure)
    }

    fn build(source: &str) -> Self {
        Self {
            source: Arc::from(source),
            script: Arc::new(redis::Script::new(source)),
        }
    }

    /// The procedure source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// SHA1 of the source, as used by `EVALSHA`.
    pub fn sha(&self) -> &str {
        self.script.get_hash()
    }

    pub(crate) fn redis_script(&self) -> &redis::Script {
        &self.script
    }
}
