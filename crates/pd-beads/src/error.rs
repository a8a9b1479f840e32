#[derive(Debug, thiserror::Error)]
pub enum BeadsError {
    #[error("failed to run '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' did not finish within {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
    #[error("'{command}' exited with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("'{command}' produced non-utf8 {stream}: {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("could not parse output of '{command}': {message}")]
    ParseOutput { command: String, message: String },
}

impl BeadsError {
    /// True for failures that mean the tracker was unreachable rather than
    /// that it rejected the request. Unavailable calls are retried with
    /// backoff; rejected ones are not.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BeadsError::Io { .. } | BeadsError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::BeadsError;

    #[test]
    fn io_and_timeout_are_unavailable() {
        let io = BeadsError::Io {
            command: "bd show x".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(io.is_unavailable());

        let timeout = BeadsError::Timeout {
            command: "bd show x".to_string(),
            timeout_secs: 30,
        };
        assert!(timeout.is_unavailable());
    }

    #[test]
    fn command_failed_is_not_unavailable() {
        let err = BeadsError::CommandFailed {
            command: "bd close x".to_string(),
            status: Some(1),
            stdout: String::new(),
            stderr: "no such issue".to_string(),
        };
        assert!(!err.is_unavailable());
    }

    #[test]
    fn timeout_error_formats_command_and_budget() {
        let err = BeadsError::Timeout {
            command: "bd show pd-1".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(err.to_string(), "'bd show pd-1' did not finish within 5s");
    }
}
