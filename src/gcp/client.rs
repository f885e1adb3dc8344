//! GCP CLI client
//!
//! Builds `gcloud`, `gsutil` and `kubectl` invocations and decodes their
//! output. The lenient helpers ([`GcpCli::query`], [`GcpCli::query_text`])
//! turn every failure into an empty result plus an error log line; the strict
//! ones ([`GcpCli::json`], [`GcpCli::text`]) hand the [`CommandError`] back to
//! the caller.

use super::runner::{excerpt, CommandError, CommandRunner, Invocation};
use crate::config::{Config, ToolPaths};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Main client for the cloud CLIs
#[derive(Clone)]
pub struct GcpCli {
    runner: Arc<dyn CommandRunner>,
    tools: ToolPaths,
    timeout: Duration,
    request_delay: Duration,
}

impl GcpCli {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            tools: config.tools.clone(),
            timeout: config.command_timeout(),
            request_delay: config.request_delay(),
        }
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Fixed pause between calls to stay under API rate limits
    pub async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    // =========================================================================
    // Invocation builders
    // =========================================================================

    /// `gcloud <args>` with the data-query timeout
    pub fn gcloud<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.tools.gcloud)
            .args(args)
            .timeout(Some(self.timeout))
    }

    /// `gsutil <args>` with the data-query timeout
    pub fn gsutil<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.tools.gsutil)
            .args(args)
            .timeout(Some(self.timeout))
    }

    /// `kubectl <args>` with the data-query timeout
    pub fn kubectl<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.tools.kubectl)
            .args(args)
            .timeout(Some(self.timeout))
    }

    // =========================================================================
    // Strict execution
    // =========================================================================

    /// Run and return raw stdout
    pub async fn text(&self, invocation: &Invocation) -> Result<String, CommandError> {
        self.runner.run(invocation).await
    }

    /// Run and parse stdout as JSON; empty output is `Value::Null`
    pub async fn json(&self, invocation: &Invocation) -> Result<Value, CommandError> {
        let stdout = self.text(invocation).await?;
        parse_json(&invocation.command_line(), &stdout)
    }

    // =========================================================================
    // Lenient execution
    // =========================================================================

    /// Run and parse JSON; any failure is logged and becomes `Value::Null`
    pub async fn query(&self, invocation: &Invocation) -> Value {
        match self.json(invocation).await {
            Ok(value) => value,
            Err(e) => {
                log_command_error(&e);
                Value::Null
            }
        }
    }

    /// Run and return trimmed stdout; any failure is logged and becomes ""
    pub async fn query_text(&self, invocation: &Invocation) -> String {
        match self.text(invocation).await {
            Ok(stdout) => stdout.trim().to_string(),
            Err(e) => {
                log_command_error(&e);
                String::new()
            }
        }
    }
}

/// Parse command output as JSON. Blank output is an empty result, not an error.
pub fn parse_json(command: &str, stdout: &str) -> Result<Value, CommandError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|source| CommandError::Parse {
        command: command.to_string(),
        source,
        output: excerpt(trimmed),
    })
}

/// Log a command failure at error level, with its stderr/output when present
pub fn log_command_error(error: &CommandError) {
    tracing::error!("{}", error);
    match error {
        CommandError::Failed { .. } => {
            if let Some(detail) = error.detail() {
                tracing::error!("Error: {}", detail);
            }
        }
        CommandError::Parse { output, .. } => {
            tracing::error!("Output was: {}", output);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_blank_is_null() {
        assert_eq!(parse_json("gcloud x", "  \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_json_valid() {
        let value = parse_json("gcloud x", r#"[{"name": "a"}]"#).unwrap();
        assert_eq!(value[0]["name"], "a");
    }

    #[test]
    fn test_parse_json_invalid_keeps_output() {
        match parse_json("gsutil lifecycle get gs://b", "gs://b has no lifecycle configuration.") {
            Err(CommandError::Parse { command, output, .. }) => {
                assert_eq!(command, "gsutil lifecycle get gs://b");
                assert!(output.contains("no lifecycle"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
