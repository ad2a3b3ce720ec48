// src/error.rs
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("expected (price, offset) pairs but got {len} values")]
    OddArgumentCount { len: usize },

    #[error("history spans no time, nothing to stretch")]
    EmptyTimeSpan,

    #[error("cannot stretch history to {0} ms")]
    InvalidTargetSpan(i64),

    #[error("offset of {0} seconds does not map to a timestamp")]
    InvalidOffset(String),
}
