use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::BeadsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeadsOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Thin runner for the issue-tracker CLI. Every call is a blocking I/O
/// boundary with a deadline: a call that outlives its timeout is killed and
/// reported as unavailable, leaving caller state unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeadsCli {
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl Default for BeadsCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("bd"),
            timeout: Duration::from_secs(30),
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

impl BeadsCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Result<BeadsOutput, BeadsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned_args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let rendered = render_command(&self.binary, &owned_args);

        let mut command = Command::new(&self.binary);
        command.current_dir(cwd);
        for arg in &owned_args {
            command.arg(arg);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| BeadsError::Io {
            command: rendered.clone(),
            source,
        })?;

        let stdout_handle = child.stdout.take().map(spawn_reader);
        let stderr_handle = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    return Err(BeadsError::Io {
                        command: rendered,
                        source,
                    });
                }
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BeadsError::Timeout {
                    command: rendered,
                    timeout_secs: self.timeout.as_secs(),
                });
            }

            thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect_stream(stdout_handle, &rendered, "stdout")?;
        let stderr = collect_stream(stderr_handle, &rendered, "stderr")?;

        if !status.success() {
            return Err(BeadsError::CommandFailed {
                command: rendered,
                status: status.code(),
                stdout,
                stderr,
            });
        }

        Ok(BeadsOutput { stdout, stderr })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn collect_stream(
    handle: Option<thread::JoinHandle<Vec<u8>>>,
    command: &str,
    stream: &'static str,
) -> Result<String, BeadsError> {
    let bytes = handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    String::from_utf8(bytes).map_err(|source| BeadsError::NonUtf8Output {
        command: command.to_string(),
        stream,
        source,
    })
}

fn render_command(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
