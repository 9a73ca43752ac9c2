//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{
    WalkOutcome, calculate_checksum, collect_files, compile_patterns, file_extension,
    read_file_bytes, read_text_file,
};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
