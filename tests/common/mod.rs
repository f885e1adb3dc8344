//! Shared helpers for integration tests
//!
//! [`ScriptedRunner`] stands in for the real CLIs: each command line maps to a
//! canned stdout or failure, and every invocation is recorded with its
//! environment and timeout.

#![allow(dead_code)]

use futures::future::BoxFuture;
use gcp_assess::collect::CollectContext;
use gcp_assess::config::Config;
use gcp_assess::gcp::client::GcpCli;
use gcp_assess::gcp::projects::Project;
use gcp_assess::gcp::runner::{CommandError, CommandRunner, Invocation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone)]
pub enum Reply {
    Stdout(String),
    /// Non-zero exit with this stderr
    Fail(String),
}

/// Command runner driven by a table of command lines
#[derive(Default)]
pub struct ScriptedRunner {
    replies: HashMap<String, Reply>,
    /// Prefix matches, checked when no exact line matches
    prefixes: Vec<(String, Reply)>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, command_line: &str, stdout: impl Into<String>) -> Self {
        self.replies
            .insert(command_line.to_string(), Reply::Stdout(stdout.into()));
        self
    }

    pub fn fail(mut self, command_line: &str, stderr: impl Into<String>) -> Self {
        self.replies
            .insert(command_line.to_string(), Reply::Fail(stderr.into()));
        self
    }

    pub fn ok_prefix(mut self, prefix: &str, stdout: impl Into<String>) -> Self {
        self.prefixes
            .push((prefix.to_string(), Reply::Stdout(stdout.into())));
        self
    }

    pub fn fail_prefix(mut self, prefix: &str, stderr: impl Into<String>) -> Self {
        self.prefixes
            .push((prefix.to_string(), Reply::Fail(stderr.into())));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.invocations().iter().map(Invocation::command_line).collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// First recorded invocation whose command line starts with `prefix`
    pub fn invocation(&self, prefix: &str) -> Option<Invocation> {
        self.invocations()
            .into_iter()
            .find(|i| i.command_line().starts_with(prefix))
    }

    pub fn called(&self, command_line: &str) -> bool {
        self.calls().iter().any(|c| c == command_line)
    }

    fn reply_for(&self, command_line: &str) -> Reply {
        if let Some(reply) = self.replies.get(command_line) {
            return reply.clone();
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| command_line.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Stdout(String::new()))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<String, CommandError>> {
        Box::pin(async move {
            let command_line = invocation.command_line();
            self.invocations.lock().unwrap().push(invocation.clone());
            match self.reply_for(&command_line) {
                Reply::Stdout(stdout) => Ok(stdout),
                Reply::Fail(stderr) => Err(CommandError::Failed {
                    command: command_line,
                    code: Some(1),
                    stderr,
                }),
            }
        })
    }
}

/// Client over a scripted runner, without rate-limit pauses
pub fn cli(runner: &Arc<ScriptedRunner>) -> GcpCli {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    GcpCli::new(runner, &Config::default()).with_request_delay(Duration::ZERO)
}

pub fn context(runner: &Arc<ScriptedRunner>, organization_id: Option<&str>) -> CollectContext {
    CollectContext::new(cli(runner), organization_id.map(str::to_string))
}

pub fn project(id: &str) -> Project {
    Project {
        project_id: id.to_string(),
        name: format!("{} name", id),
        project_number: "100".to_string(),
        lifecycle_state: "ACTIVE".to_string(),
    }
}

/// In-memory sink for formatted log lines
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's events into a fresh capture until the guard drops.
    /// Tasks spawned on a current-thread runtime log here too.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Messages logged at ERROR level
    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|line| {
                line.trim_start()
                    .strip_prefix("ERROR")
                    .map(|message| message.trim().to_string())
            })
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
