//! Top-level error type composing the per-component errors at the
//! `Engine` API boundary, mirroring the teacher's layered
//! `WardError`-over-`ChecksumError`/`DirListError` composition.

use crate::matcher::MatcherError;

/// Errors that can escape the engine's public API. Per the error handling
/// design, only construction/configuration problems are fatal; filesystem
/// errors encountered during a scan are recovered locally and logged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] MatcherError),
}
