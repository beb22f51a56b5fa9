use std::io;

use log::error;
use thiserror::Error;

/// An error raised by a script-invoked operation.
///
/// Each variant carries the numeric code the host's error reporter is called
/// with; see [`HostError::code`].
#[derive(Debug, Error)]
pub enum HostError {
    #[error("not enough arguments")]
    NotEnoughArguments,

    #[error("argument is not a function")]
    NotAFunction,

    #[error("argument is not a string")]
    ArgumentNotString,

    #[error("argument is not an integer")]
    ArgumentNotInt,

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("failed: {0}")]
    Failed(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("failing test suite")]
    FailingTestSuite,

    #[error("not all test cases run")]
    NotAllTestCasesRun,
}

impl HostError {
    /// The numeric error code reported to the host.
    pub fn code(&self) -> u32 {
        match self {
            HostError::NotEnoughArguments => 1,
            HostError::NotAFunction => 2,
            HostError::ArgumentNotString => 3,
            HostError::ArgumentNotInt => 4,
            HostError::Socket(_) => 5,
            HostError::Failed(_) => 6,
            HostError::InvalidName(_) => 7,
            HostError::FailingTestSuite => 8,
            HostError::NotAllTestCasesRun => 9,
        }
    }
}

/// Receives errors that surface outside a script frame, e.g. from inside a
/// dispatch callback.
pub trait ErrorReporter {
    fn report(&self, err: &HostError);
}

/// Routes reported errors through the `log` crate.
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, err: &HostError) {
        error!("script error {}: {}", err.code(), err);
    }
}

#[cfg(test)]
mod test {
    use super::HostError;

    #[test]
    fn codes_are_stable() {
        assert_eq!(HostError::NotEnoughArguments.code(), 1);
        assert_eq!(HostError::Failed("x".into()).code(), 6);
        assert_eq!(HostError::NotAllTestCasesRun.code(), 9);
    }
}
