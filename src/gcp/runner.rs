//! Command Runner
//!
//! Runs the external cloud CLIs (`gcloud`, `gsutil`, `kubectl`) as child
//! processes with a timeout and reports a typed outcome.

use futures::future::BoxFuture;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Maximum length of command output carried in errors (to keep logs readable)
const MAX_LOG_OUTPUT_LENGTH: usize = 500;

/// A fully-formed external command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables for the child process
    pub env: Vec<(String, String)>,
    /// `None` waits for the process however long it takes
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments joined with spaces, as logged and matched in tests
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Why an external command produced no usable output
#[derive(Debug, Error)]
pub enum CommandError {
    /// The binary could not be started or waited on (usually not installed)
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {}s: {command}", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("command failed with {}: {command}", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Non-empty output that is not valid JSON
    #[error("JSON parsing error for `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
        output: String,
    },
}

impl CommandError {
    /// Text the command printed that explains the failure, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            CommandError::Failed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            CommandError::Parse { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Trim command output for logs and error payloads
pub fn excerpt(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.len() <= MAX_LOG_OUTPUT_LENGTH {
        return trimmed.to_string();
    }
    let mut end = MAX_LOG_OUTPUT_LENGTH;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated, {} bytes total]", &trimmed[..end], trimmed.len())
}

/// Executes invocations. Implemented by [`SystemRunner`] for real processes
/// and by scripted runners in tests.
pub trait CommandRunner: Send + Sync {
    /// Run the invocation and return its stdout
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<String, CommandError>>;
}

/// Runs invocations as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<String, CommandError>> {
        Box::pin(execute(invocation))
    }
}

/// Spawn the process, wait for it (bounded by the invocation timeout) and
/// collect stdout. The child is killed if the timeout fires.
pub async fn execute(invocation: &Invocation) -> Result<String, CommandError> {
    let command_line = invocation.command_line();
    tracing::debug!("Executing: {}", command_line);

    let child = Command::new(&invocation.program)
        .args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Io {
            command: command_line.clone(),
            source,
        })?;

    let waited = match invocation.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(waited) => waited,
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: command_line,
                    after: limit,
                })
            }
        },
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|source| CommandError::Io {
        command: command_line.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            command: command_line,
            code: output.status.code(),
            stderr: excerpt(&String::from_utf8_lossy(&output.stderr)),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
