//! Background process supervision
//!
//! A [`BackgroundProcess`] owns one child running in its own process group.
//! The group receives SIGTERM exactly once: from [`BackgroundProcess::kill`],
//! from [`BackgroundProcess::shutdown`], or from `Drop` if neither ran.

use crate::config::STDERR_TAIL_LINES;
use crate::error::{LauncherError, LauncherResult};
use crate::platform::{self, SignalDelivery};
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bounded buffer holding the most recent lines of a child's stderr
#[derive(Debug)]
struct OutputTail {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl OutputTail {
    fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines.min(64)),
            max_lines,
        }
    }

    fn push(&mut self, line: String) {
        if self.max_lines == 0 {
            return;
        }
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn render(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

pub struct BackgroundProcess {
    child: Child,
    pid: u32,
    command: String,
    stderr: Arc<Mutex<OutputTail>>,
    stderr_task: Option<JoinHandle<()>>,
    status: Option<ExitStatus>,
    killed: bool,
}

impl BackgroundProcess {
    /// Launch `argv` detached into a new process group without waiting for it.
    pub fn spawn(argv: &[String]) -> LauncherResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LauncherError::Config("empty command line".to_string()))?;
        let executable = platform::resolve_executable(program)
            .ok_or_else(|| LauncherError::ExecutableNotFound(program.clone()))?;
        let command_line = argv.join(" ");

        debug!("Running background {:?}...", argv);

        let mut command = Command::new(&executable);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::piped());
        platform::prepare_command(&mut command);

        let mut child = command.spawn().map_err(|source| LauncherError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| LauncherError::Spawn {
            command: command_line.clone(),
            source: io::Error::other("child exited before its pid was read"),
        })?;

        let stderr = Arc::new(Mutex::new(OutputTail::new(STDERR_TAIL_LINES)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(collect_lines(pipe, stderr.clone())));

        debug!("Started background process pid={} ({})", pid, command_line);

        Ok(Self {
            child,
            pid,
            command: command_line,
            stderr,
            stderr_task,
            status: None,
            killed: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The child leads its own group, so the group id equals its pid.
    pub fn process_group(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Block until the child exits.
    ///
    /// Returns once the stderr pipe has been drained, so [`Self::stderr_output`]
    /// is complete afterwards. Calling it again returns the cached status.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        if let Some(task) = self.stderr_task.take() {
            // grandchildren may still hold the pipe open
            if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
                debug!("pid={} stderr still open after exit", self.pid);
            }
        }
        Ok(status)
    }

    /// Send SIGTERM to the whole process group.
    ///
    /// Only the first call signals. A group that no longer exists is logged and ignored.
    pub fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        debug!("Killing subprocess...");
        match platform::signal_process_group(self.process_group(), Signal::SIGTERM) {
            Ok(SignalDelivery::Delivered) => {}
            Ok(SignalDelivery::Gone) => {
                warn!("Could not find subprocess to kill (pgid={})", self.process_group())
            }
            Err(err) => warn!(
                "Failed to signal process group {}: {}",
                self.process_group(),
                err
            ),
        }
    }

    /// Terminate the group and reap the child.
    ///
    /// SIGTERM first; if the child is still running after `grace`, the group gets SIGKILL.
    /// Group members still alive once the child has been reaped are killed as well.
    pub async fn shutdown(&mut self, grace: Duration) -> Option<ExitStatus> {
        self.kill();
        let status = match self.status {
            Some(status) => Some(status),
            None => self.reap(grace).await,
        };
        if platform::process_group_alive(self.process_group()) {
            debug!("Process group {} outlived its leader, sending SIGKILL", self.process_group());
            if let Err(err) = platform::signal_process_group(self.process_group(), Signal::SIGKILL) {
                warn!("Failed to SIGKILL process group {}: {}", self.process_group(), err);
            }
        }
        status
    }

    async fn reap(&mut self, grace: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                warn!("Failed to wait for pid={}: {}", self.pid, err);
                None
            }
            Err(_) => {
                warn!(
                    "pid={} still running {:?} after SIGTERM, sending SIGKILL",
                    self.pid, grace
                );
                if let Err(err) =
                    platform::signal_process_group(self.process_group(), Signal::SIGKILL)
                {
                    warn!("Failed to SIGKILL process group {}: {}", self.pid, err);
                }
                self.wait().await.ok()
            }
        }
    }

    /// Captured stderr of the child (most recent lines only)
    pub fn stderr_output(&self) -> String {
        self.stderr.lock().render()
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        if !self.killed {
            self.kill();
        }
    }
}

impl std::fmt::Debug for BackgroundProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundProcess")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("status", &self.status)
            .field("killed", &self.killed)
            .finish()
    }
}

async fn collect_lines<R>(reader: R, tail: Arc<Mutex<OutputTail>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "trigger_service", "{}", line);
                tail.lock().push(line);
            }
            Ok(None) => break,
            Err(err) => {
                debug!("stderr reader stopped: {}", err);
                break;
            }
        }
    }
}
