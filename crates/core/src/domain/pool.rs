// Worker Pool Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Which bounded pool a scheduled run executes on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Lightweight runs on the async runtime, bounded by `max_threads`
    #[default]
    Thread,
    /// Isolated runs in a child process, bounded by `max_processes`
    Process,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Thread => write!(f, "thread"),
            PoolKind::Process => write!(f, "process"),
        }
    }
}

impl FromStr for PoolKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread" => Ok(PoolKind::Thread),
            "process" => Ok(PoolKind::Process),
            other => Err(DomainError::ValidationError(format!(
                "unknown pool kind '{}'",
                other
            ))),
        }
    }
}
