#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid launch request: {message}")]
    InvalidRequest { message: String },
    #[error("failed to run '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl LaunchError {
    /// True when the multiplexer was unreachable rather than rejecting the
    /// request; unreachable calls are retried with backoff by the engine.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LaunchError::Io { .. })
    }
}
