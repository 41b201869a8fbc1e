// src/recipe/kitchen/runner.rs

//! Running stage commands
//!
//! The kitchen hands every resolved command to a [`CommandRunner`]. The
//! default [`ShellRunner`] passes it to `/bin/sh -c` with:
//! - a cleared environment containing only the plan's variables
//! - stdin connected to `/dev/null`
//! - its own process group, killed as a whole on timeout and again once the
//!   shell exits, so no background process outlives its command
//!
//! stdout and stderr are drained on helper threads while the command runs,
//! so a build that writes more than a pipe buffer never stalls. A process
//! that left the group and still holds a pipe is waited on for
//! [`DRAIN_GRACE`] at most.

use crate::error::{Error, Result};
use crate::recipe::stage::Stage;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How long to keep reading output after the shell has exited
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One command to execute
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub stage: Stage,
    pub command: &'a str,
    pub workdir: &'a Path,
    pub env: &'a BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// What a finished command produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal or timed out
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// Human readable description of a failure
    pub fn describe_failure(&self, timeout: Option<Duration>) -> String {
        if self.timed_out {
            match timeout {
                Some(t) => format!("timed out after {}s", t.as_secs()),
                None => "timed out".to_string(),
            }
        } else {
            match self.status {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

/// Executes stage commands
///
/// Returns `Err` only when the command could not be started; a command that
/// ran and failed is reported through [`CommandOutput`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation<'_>) -> Result<CommandOutput>;
}

/// Runs commands through a POSIX shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell binary
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, inv: &Invocation<'_>) -> Result<CommandOutput> {
        debug!("[{}] $ {}", inv.stage, inv.command);
        let start = Instant::now();

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(inv.command)
            .current_dir(inv.workdir)
            .env_clear()
            .envs(inv.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to spawn {} in {}: {}",
                    self.shell.display(),
                    inv.workdir.display(),
                    e
                ))
            })?;

        let stdout = child.stdout.take().map(|out| drain(out, inv.stage, false));
        let stderr = child.stderr.take().map(|err| drain(err, inv.stage, true));

        let (status, timed_out) = match inv.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => (Some(status), false),
                None => {
                    warn!("[{}] command timed out after {:?}, killing", inv.stage, timeout);
                    kill_group(child.id());
                    let _ = child.kill();
                    let _ = child.wait();
                    (None, true)
                }
            },
            None => (Some(child.wait()?), false),
        };

        // Background jobs left behind by the shell
        kill_group(child.id());

        Ok(CommandOutput {
            status: status.and_then(|s: ExitStatus| s.code()),
            stdout: finish_drain(stdout, inv.stage),
            stderr: finish_drain(stderr, inv.stage),
            timed_out,
            duration: start.elapsed(),
        })
    }
}

fn kill_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // ESRCH once every member has exited
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!("killpg({}): {}", raw, e);
    }
}

/// Output collected by a drain thread
struct Drain {
    collected: Arc<Mutex<String>>,
    done: Receiver<()>,
}

/// Read a pipe to the end on a helper thread, logging each line
fn drain<R: Read + Send + 'static>(pipe: R, stage: Stage, is_stderr: bool) -> Drain {
    let collected = Arc::new(Mutex::new(String::new()));
    let (done_tx, done) = mpsc::channel();
    let sink = Arc::clone(&collected);

    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let trimmed = text.trim_end_matches(['\n', '\r']);
                    if is_stderr {
                        debug!("[{}] stderr: {}", stage, trimmed);
                    } else {
                        debug!("[{}] {}", stage, trimmed);
                    }
                    if let Ok(mut out) = sink.lock() {
                        out.push_str(&text);
                    }
                }
                Err(e) => {
                    debug!("[{}] output pipe closed: {}", stage, e);
                    break;
                }
            }
        }

        let _ = done_tx.send(());
    });

    Drain { collected, done }
}

/// Wait up to [`DRAIN_GRACE`] for a drain to reach end of file, then take
/// whatever it has collected
fn finish_drain(drain: Option<Drain>, stage: Stage) -> String {
    let Some(drain) = drain else {
        return String::new();
    };
    if let Err(RecvTimeoutError::Timeout) = drain.done.recv_timeout(DRAIN_GRACE) {
        warn!(
            "[{}] output pipe still held open by a detached process, not waiting for it",
            stage
        );
    }
    drain
        .collected
        .lock()
        .map(|mut out| std::mem::take(&mut *out))
        .unwrap_or_default()
}
