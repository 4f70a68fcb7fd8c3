// ABOUTME: Compose command error types with SNAFU pattern.
// ABOUTME: Separates spawn failures from non-zero exits for programmatic handling.

use snafu::Snafu;

/// Failure of a compose CLI invocation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ComposeError {
    #[snafu(display("failed to run {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` exited with {status}: {stderr}"))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeErrorKind {
    /// The runtime binary could not be executed.
    RuntimeUnavailable,
    /// The command ran and reported failure.
    CommandFailed,
}

impl ComposeError {
    pub fn kind(&self) -> ComposeErrorKind {
        match self {
            ComposeError::Spawn { .. } => ComposeErrorKind::RuntimeUnavailable,
            ComposeError::CommandFailed { .. } => ComposeErrorKind::CommandFailed,
        }
    }
}
