//! Oracle transport
//!
//! The engine only needs `send(request) -> response`. Hosts plug in whatever
//! backend they like; any `Fn(&str) -> CategorizeResult<String>` works, and
//! [`CommandTransport`] pipes requests through an external program.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CategorizeError, CategorizeResult};

/// Sends one request to the oracle and returns its raw answer
pub trait OracleTransport: Send + Sync {
    fn send(&self, request: &str) -> CategorizeResult<String>;
}

impl<F> OracleTransport for F
where
    F: Fn(&str) -> CategorizeResult<String> + Send + Sync,
{
    fn send(&self, request: &str) -> CategorizeResult<String> {
        self(request)
    }
}

/// Runs an external command per request: request on stdin, response on stdout
///
/// The request is written while the output is drained, so programs that
/// answer as they read never stall on a full pipe. A child still running at
/// the deadline is killed.
#[derive(Debug, Clone)]
pub struct CommandTransport {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl CommandTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(30),
        }
    }

    /// Split a command line on whitespace into program and arguments
    pub fn parse(command_line: &str) -> CategorizeResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CategorizeError::Config("Oracle command is empty".into()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Kill the child if it has not exited after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> CategorizeResult<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CategorizeError::OracleTransport(format!(
                    "Failed to start '{}': {}",
                    self.program, e
                ))
            })
    }

    /// Poll the child until it exits or the deadline passes
    fn wait_until(&self, child: &mut Child, deadline: Instant) -> CategorizeResult<ExitStatus> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    warn!(program = %self.program, "Oracle command timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                    return Err(CategorizeError::OracleTimeout(timeout_ms));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CategorizeError::OracleTransport(format!(
                        "Failed to wait for '{}': {}",
                        self.program, e
                    )));
                }
            }
        }
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }
    buffer
}

impl OracleTransport for CommandTransport {
    fn send(&self, request: &str) -> CategorizeResult<String> {
        debug!(program = %self.program, bytes = request.len(), "Sending oracle request");

        let deadline = Instant::now() + self.timeout;
        let mut child = self.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, written, stdout, stderr) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                // Dropping stdin at the end of the closure sends EOF
                Some(mut stdin) => stdin.write_all(request.as_bytes()),
                None => Ok(()),
            });
            let stdout = scope.spawn(move || drain(stdout));
            let stderr = scope.spawn(move || drain(stderr));

            let status = self.wait_until(&mut child, deadline);
            (
                status,
                writer.join().unwrap_or(Ok(())),
                stdout.join().unwrap_or_default(),
                stderr.join().unwrap_or_default(),
            )
        });
        let status = status?;

        if !status.success() {
            return Err(CategorizeError::OracleTransport(format!(
                "'{}' exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        // A program may answer without reading all of its input
        if let Err(e) = written {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(CategorizeError::OracleTransport(format!(
                    "Failed to write request: {}",
                    e
                )));
            }
        }

        String::from_utf8(stdout).map_err(|e| {
            CategorizeError::OracleMalformedResponse(format!("Response is not UTF-8: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_transport() {
        let transport = |request: &str| -> CategorizeResult<String> { Ok(request.to_uppercase()) };
        assert_eq!(transport.send("ping").unwrap(), "PING");
    }

    #[test]
    fn test_parse_command_line() {
        let transport = CommandTransport::parse("oracle-cli --model small").unwrap();
        assert_eq!(transport.program, "oracle-cli");
        assert_eq!(transport.args, vec!["--model", "small"]);

        assert!(CommandTransport::parse("   ").is_err());
    }

    #[test]
    fn test_missing_program_is_transport_error() {
        let transport = CommandTransport::new("definitely-not-a-real-oracle-binary", vec![]);
        let err = transport.send("{}").unwrap_err();
        assert!(matches!(err, CategorizeError::OracleTransport(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_round_trip() {
        let transport = CommandTransport::new("cat", vec![]);
        assert_eq!(transport.send("[1,2,3]").unwrap(), "[1,2,3]");
    }

    #[cfg(unix)]
    #[test]
    fn test_large_request_is_streamed() {
        let transport = CommandTransport::new("cat", vec![]).with_timeout(Duration::from_secs(10));
        let request = "x".repeat(1 << 20);
        let response = transport.send(&request).unwrap();
        assert_eq!(response.len(), request.len());
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_command_is_killed_at_deadline() {
        let transport = CommandTransport::new("sleep", vec!["5".into()])
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = transport.send("{}").unwrap_err();
        assert!(matches!(err, CategorizeError::OracleTimeout(200)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_status() {
        let transport = CommandTransport::new("false", vec![]);
        assert!(transport.send("{}").unwrap_err().is_oracle_failure());
    }
}
