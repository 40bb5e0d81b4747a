//! Supervised child processes
//!
//! A [`ProcessHandle`] owns one spawned child. Waiting is cancellation-aware:
//! [`ProcessHandle::terminate`] unblocks any pending [`ProcessHandle::wait`]
//! before it signals the child, so a blocked waiter never holds up shutdown.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use cx_core::error::ProcessError;

/// How a wait on a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited on its own
    Exited(ExitStatus),
    /// Termination was requested before the process exited
    Stopped,
}

/// What `terminate` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Nothing to do: the process had already exited or was already cleared
    AlreadyExited,
    /// Exited within the grace period after the termination request
    Graceful(ExitStatus),
    /// Had to be force-killed
    Killed,
}

/// Handle to a running child process
#[derive(Debug)]
pub struct ProcessHandle {
    program: String,
    pid: u32,
    child: Mutex<Option<Child>>,
    stop: CancellationToken,
    alive: AtomicBool,
}

impl ProcessHandle {
    /// Spawn `program` with `args`.
    ///
    /// The child inherits stdout/stderr, gets a null stdin, and is killed if
    /// the handle is dropped while it is still running.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, ProcessError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotInstalled {
                    program: program.to_string(),
                }
            } else {
                ProcessError::Spawn {
                    program: program.to_string(),
                    source,
                }
            }
        })?;

        let pid = child.id().unwrap_or_default();
        tracing::debug!("Spawned {} (pid={})", program, pid);

        Ok(Self {
            program: program.to_string(),
            pid,
            child: Mutex::new(Some(child)),
            stop: CancellationToken::new(),
            alive: AtomicBool::new(true),
        })
    }

    /// OS process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Program name the process was started from
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the process is believed to still be running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Block until the process exits or termination is requested
    pub async fn wait(&self) -> Result<ProcessExit, ProcessError> {
        if self.stop.is_cancelled() {
            return Ok(ProcessExit::Stopped);
        }

        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(ProcessExit::Stopped);
        };

        tokio::select! {
            result = child.wait() => {
                let status = result.map_err(|source| ProcessError::Wait { pid: self.pid, source })?;
                self.alive.store(false, Ordering::Release);
                tracing::info!("{} (pid={}) exited: {}", self.program, self.pid, status);
                Ok(ProcessExit::Exited(status))
            }
            _ = self.stop.cancelled() => Ok(ProcessExit::Stopped),
        }
    }

    /// Ask the process to exit, force-killing it after `grace`.
    ///
    /// Idempotent: a process that already exited, or a handle that was
    /// already terminated, yields [`TerminateOutcome::AlreadyExited`] and no
    /// signal is sent. The handle is cleared afterwards.
    pub async fn terminate(&self, grace: Duration) -> Result<TerminateOutcome, ProcessError> {
        // Release any waiter before contending for the child
        self.stop.cancel();

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(TerminateOutcome::AlreadyExited);
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.alive.store(false, Ordering::Release);
                tracing::debug!("{} (pid={}) already exited: {}", self.program, self.pid, status);
                return Ok(TerminateOutcome::AlreadyExited);
            }
            Ok(None) => {}
            Err(source) => return Err(ProcessError::Wait { pid: self.pid, source }),
        }

        tracing::info!("Terminating {} (pid={})", self.program, self.pid);
        self.request_exit(&mut child);

        let outcome = match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => TerminateOutcome::Graceful(status),
            Ok(Err(source)) => return Err(ProcessError::Wait { pid: self.pid, source }),
            Err(_) => {
                tracing::warn!(
                    "{} (pid={}) did not exit within {:?}, killing",
                    self.program,
                    self.pid,
                    grace
                );
                child
                    .kill()
                    .await
                    .map_err(|source| ProcessError::Kill { pid: self.pid, source })?;
                TerminateOutcome::Killed
            }
        };

        self.alive.store(false, Ordering::Release);
        Ok(outcome)
    }

    /// Send SIGTERM on Unix; elsewhere there is no graceful request, so kill
    #[cfg(unix)]
    fn request_exit(&self, _child: &mut Child) {
        // SAFETY: kill(2) has no memory-safety preconditions; the child is not
        // yet reaped, so the pid cannot have been reused.
        let ret = unsafe { libc::kill(self.pid as libc::pid_t, libc::SIGTERM) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            tracing::warn!("Failed to send SIGTERM to pid {}: {}", self.pid, err);
        }
    }

    #[cfg(not(unix))]
    fn request_exit(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::warn!("Failed to stop pid {}: {}", self.pid, e);
        }
    }
}
