//! Journal streaming
//!
//! Follows a unit's log by running `journalctl -f` and reading its stdout.
//!
//! - [`Journal::stream`] hands the output back as an [`AsyncRead`]
//! - [`Journal::write_logs_to`] copies the output into a writer until the
//!   process exits, the output ends, or the caller cancels
//!
//! Either way the journalctl process never outlives its stream.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::oneshot;

use crate::race::{race_then_cleanup, Winner};

pub const JOURNALCTL_PATH: &str = "/usr/bin/journalctl";

/// Where in the log to start following from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Since {
    /// Only entries written from now on
    #[default]
    Now,
    /// Entries from this long ago onwards (whole seconds)
    Ago(Duration),
    /// Entries from a point in local time onwards
    At(DateTime<Local>),
}

impl Since {
    /// The `--since=` argument for journalctl
    pub fn as_arg(&self) -> String {
        match self {
            Self::Now => "--since=now".to_string(),
            Self::Ago(ago) if ago.as_secs() == 0 => "--since=now".to_string(),
            Self::Ago(ago) => format!("--since=-{}", ago.as_secs()),
            Self::At(at) => format!("--since={}", at.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// How to run the log reader
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Log reader executable
    pub program: PathBuf,
    /// Arguments placed before the generated ones (e.g. for a wrapper like sudo)
    pub prefix_args: Vec<String>,
    /// Follow user units (`--user-unit`) instead of system units
    pub user: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(JOURNALCTL_PATH),
            prefix_args: Vec::new(),
            user: false,
        }
    }
}

impl JournalConfig {
    /// Parse a shell-quoted command line, e.g. `"sudo -n journalctl"`
    pub fn from_command_line(line: &str) -> Result<Self, JournalError> {
        let mut parts = shlex::split(line)
            .ok_or_else(|| JournalError::InvalidCommand(line.to_string()))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| JournalError::InvalidCommand(line.to_string()))?;

        Ok(Self {
            program: PathBuf::from(program),
            prefix_args: parts.collect(),
            user: false,
        })
    }

    /// Follow user units instead of system units
    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    fn args(&self, unit: &str, since: Since) -> Vec<String> {
        let unit_flag = if self.user { "--user-unit" } else { "--unit" };
        let mut args = self.prefix_args.clone();
        args.extend([
            since.as_arg(),
            "-f".to_string(),
            "-q".to_string(),
            unit_flag.to_string(),
            unit.to_string(),
        ]);
        args
    }
}

/// Runs the log reader for one unit at a time
#[derive(Debug, Clone, Default)]
pub struct Journal {
    config: JournalConfig,
}

impl Journal {
    pub fn new(config: JournalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    fn spawn(&self, unit: &str, since: Since) -> Result<(Child, ChildStdout), JournalError> {
        let args = self.config.args(unit, since);
        log::debug!(
            "journal: running {} {}",
            self.config.program.display(),
            shlex::try_join(args.iter().map(String::as_str)).unwrap_or_default()
        );

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(JournalError::Spawn)?;

        let stdout = child.stdout.take().ok_or(JournalError::NoStdout)?;
        Ok((child, stdout))
    }

    /// Start following `unit`'s log and return its output.
    ///
    /// Dropping the stream kills the reader; [`LogStream::close`] also
    /// waits for it.
    pub fn stream(&self, unit: &str, since: Since) -> Result<LogStream, JournalError> {
        let (child, stdout) = self.spawn(unit, since)?;
        Ok(LogStream { child, stdout })
    }

    /// Copy `unit`'s log into `sink` until one of:
    ///
    /// - the reader exits (an error unless it exited cleanly)
    /// - its output ends or the copy fails
    /// - `until` resolves
    ///
    /// Whichever comes first, the output pipe is closed and the reader is
    /// killed and reaped before this returns.
    pub async fn write_logs_to<W, C>(
        &self,
        sink: &mut W,
        unit: &str,
        since: Since,
        until: C,
    ) -> Result<Stopped, JournalError>
    where
        W: AsyncWrite + Unpin + ?Sized,
        C: Future<Output = ()>,
    {
        let (mut child, mut stdout) = self.spawn(unit, since)?;
        let (close_tx, close_rx) = oneshot::channel::<()>();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let exited = async move {
            tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        log::debug!("journal: kill failed: {}", e);
                    }
                    child.wait().await
                }
            }
        };

        // The pipe is dropped when this future finishes
        let copied = async move {
            tokio::select! {
                res = tokio::io::copy(&mut stdout, sink) => res.map(|_| ()),
                _ = close_rx => Ok(()),
            }
        };

        let winner = race_then_cleanup(exited, copied, until, move || {
            let _ = close_tx.send(());
            let _ = kill_tx.send(());
        })
        .await;

        match winner {
            Winner::First(Ok(status)) if status.success() => {
                log::info!("journal: Process exited: {}", status);
                Ok(Stopped::Exited)
            }
            Winner::First(Ok(status)) => {
                log::warn!("journal: Process exited unexpectedly: {}", status);
                Err(JournalError::Exited(status))
            }
            Winner::First(Err(e)) => {
                log::warn!("journal: Process exited unexpectedly: {}", e);
                Err(JournalError::Wait(e))
            }
            Winner::Second(Ok(())) => {
                log::info!("journal: Write completed");
                Ok(Stopped::Completed)
            }
            Winner::Second(Err(e)) => {
                log::warn!("journal: Output closed before process exited: {}", e);
                Err(JournalError::Copy(e))
            }
            Winner::Cancelled => {
                log::info!("journal: Done");
                Ok(Stopped::Cancelled)
            }
        }
    }
}

/// Why [`Journal::write_logs_to`] stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// The reader exited cleanly
    Exited,
    /// The reader closed its output while still running
    Completed,
    /// The caller cancelled
    Cancelled,
}

/// Output of a running log reader
#[derive(Debug)]
pub struct LogStream {
    child: Child,
    stdout: ChildStdout,
}

impl LogStream {
    /// PID of the reader, if it has not been reaped yet
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Close the pipe, kill the reader and wait for it to exit
    pub async fn close(self) -> io::Result<()> {
        let Self { mut child, stdout } = self;
        drop(stdout);
        if let Err(e) = child.start_kill() {
            log::debug!("journal: kill failed: {}", e);
        }
        child.wait().await.map(|_| ())
    }
}

impl AsyncRead for LogStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Invalid log reader command: {0:?}")]
    InvalidCommand(String),

    #[error("Failed to start log reader: {0}")]
    Spawn(#[source] io::Error),

    #[error("Log reader has no stdout pipe")]
    NoStdout,

    #[error("Log reader exited unexpectedly: {0}")]
    Exited(ExitStatus),

    #[error("Failed to wait for log reader: {0}")]
    Wait(#[source] io::Error),

    #[error("Failed to copy log output: {0}")]
    Copy(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_since_args() {
        assert_eq!(Since::Now.as_arg(), "--since=now");
        assert_eq!(Since::Ago(Duration::ZERO).as_arg(), "--since=now");
        assert_eq!(Since::Ago(Duration::from_secs(300)).as_arg(), "--since=-300");

        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(Since::At(at).as_arg(), "--since=2024-03-09 14:05:00");
    }

    #[test]
    fn test_reader_args() {
        let config = JournalConfig::default();
        assert_eq!(
            config.args("foo.service", Since::Now),
            ["--since=now", "-f", "-q", "--unit", "foo.service"]
        );

        let config = JournalConfig::from_command_line("sudo -n 'journalctl'")
            .unwrap()
            .user(true);
        assert_eq!(config.program, PathBuf::from("sudo"));
        assert_eq!(
            config.args("bar.service", Since::Ago(Duration::from_secs(60))),
            ["-n", "journalctl", "--since=-60", "-f", "-q", "--user-unit", "bar.service"]
        );
    }

    #[test]
    fn test_invalid_command_line() {
        assert!(matches!(
            JournalConfig::from_command_line(""),
            Err(JournalError::InvalidCommand(_))
        ));
        assert!(matches!(
            JournalConfig::from_command_line("journalctl 'unterminated"),
            Err(JournalError::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let journal = Journal::new(JournalConfig {
            program: PathBuf::from("/nonexistent/journalctl"),
            ..JournalConfig::default()
        });

        assert!(matches!(
            journal.stream("foo.service", Since::Now),
            Err(JournalError::Spawn(_))
        ));

        let mut sink = Vec::new();
        let err = journal
            .write_logs_to(&mut sink, "foo.service", Since::Now, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::Spawn(_)));
        assert!(sink.is_empty());
    }
}
