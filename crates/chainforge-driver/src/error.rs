use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// The configuration tool could not reach the target host (its exit
    /// code 4). The one retryable failure.
    #[error("server unreachable")]
    ServerUnreachable,

    /// The tool ran and exited non-zero.
    #[error("execution error for [{tool} {args}]: {stderr}")]
    CommandFailed {
        tool: &'static str,
        args: String,
        stderr: String,
    },

    /// The tool could not be started at all.
    #[error("exec command for [{tool} {args}]: {source}")]
    Spawn {
        tool: &'static str,
        args: String,
        source: std::io::Error,
    },

    #[error("internal driver error: {0}")]
    Internal(String),
}
