//! Error types for the pingpong benchmark.

use std::io;

use crate::pairs::Pair;

/// Exit status used when the participant count violates a mode's precondition.
pub const EXIT_PRECONDITION: i32 = 1;
/// Exit status used when a pair's private context could not be created.
pub const EXIT_CHANNEL_CREATION: i32 = 2;
/// Exit status for transport, IO and output failures.
pub const EXIT_RUNTIME: i32 = 3;

/// Benchmark errors. None of these are recoverable: a run either completes
/// or the whole group aborts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Participant count does not satisfy the selected mode.
    #[error("precondition violated with {size} participants: {reason}")]
    Precondition { size: usize, reason: &'static str },

    /// Context creation for a pair returned an invalid handle.
    #[error("failed to create private channel for pair {pair}")]
    ChannelCreation { pair: Pair },

    /// Send/receive/barrier failed in the underlying transport.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The process group was aborted, possibly by another participant.
    #[error("process group aborted with status {code}")]
    Aborted { code: i32 },

    /// Invalid benchmark configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Error {
    /// Process exit status that reports this error to the launcher.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Precondition { .. } => EXIT_PRECONDITION,
            Error::ChannelCreation { .. } => EXIT_CHANNEL_CREATION,
            Error::Aborted { code } => *code,
            _ => EXIT_RUNTIME,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_nonzero() {
        let errors = [
            Error::Precondition {
                size: 3,
                reason: "even participant count required",
            },
            Error::ChannelCreation {
                pair: Pair::new(1, 3),
            },
            Error::Transport("peer disconnected".into()),
            Error::Config("zero repetitions".into()),
        ];
        let codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        assert_eq!(codes, vec![1, 2, 3, 3]);
    }

    #[test]
    fn test_aborted_keeps_code() {
        assert_eq!(Error::Aborted { code: 2 }.exit_code(), 2);
    }

    #[test]
    fn test_channel_creation_message_names_pair() {
        let e = Error::ChannelCreation {
            pair: Pair::new(1, 3),
        };
        assert_eq!(e.to_string(), "failed to create private channel for pair (1, 3)");
    }
}
