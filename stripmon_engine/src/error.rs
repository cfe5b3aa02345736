//! Engine error taxonomy. Transient source failures are recoverable by
//! design; miners log them and keep their last good values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Element-wise ops require equal ring-buffer capacities.
    #[error("time series capacity mismatch: {left} vs {right}")]
    CapacityMismatch { left: usize, right: usize },

    /// A raw counter source could not be read this tick.
    #[error("counter source unavailable: {0}")]
    SourceUnavailable(String),

    /// A remote fetch completed after being superseded by a newer request.
    #[error("fetch superseded (generation {got}, current {current})")]
    FetchSuperseded { got: u64, current: u64 },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("malformed feed payload: {0}")]
    FeedParse(String),

    #[error("config error: {0}")]
    Config(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
