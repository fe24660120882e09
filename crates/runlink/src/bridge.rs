//! Supervised runtime child process bridge.
//!
//! Owns exactly one child process: launches the runtime with all three stdio
//! channels redirected, exposes them as byte channels, and guarantees the
//! child is gone when the bridge is disposed: gracefully within
//! [`GRACEFUL_EXIT_TIMEOUT`], forcibly (process group and all) after it.
//!
//! Lifecycle is strictly one-shot: construct, use the streams, dispose.
//! Disposal is idempotent and safe to race with the process-wide shutdown
//! sweep in [`crate::shutdown`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{LaunchSpec, RuntimePathProvider};
use crate::error::{Error, Result};
use crate::shutdown;

/// Voluntary-exit window between input-channel closure and force-kill.
pub const GRACEFUL_EXIT_TIMEOUT_MS: u64 = 5_000;

/// [`GRACEFUL_EXIT_TIMEOUT_MS`] as a [`Duration`].
pub const GRACEFUL_EXIT_TIMEOUT: Duration = Duration::from_millis(GRACEFUL_EXIT_TIMEOUT_MS);

/// Child handle plus the pieces disposal must close. Shared between the
/// bridge and the shutdown registry so either side can run teardown; the
/// mutex serializes them and `released` makes the second caller a no-op.
pub(crate) struct Supervised {
    child: Child,
    stdin: Option<ChildStdin>,
    released: bool,
}

/// Bridge to a supervised runtime child process.
///
/// All three stdio channels are UTF-8 byte streams without a byte-order
/// mark; message framing on top of them is the consumer's concern.
pub struct ProcessBridge {
    state: Arc<Mutex<Supervised>>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    hook_id: u64,
    pid: Option<u32>,
}

impl ProcessBridge {
    /// Resolve configuration and start the runtime.
    ///
    /// The child starts executing before this returns; the only way back is
    /// [`dispose`](Self::dispose). A launch failure (runtime executable
    /// missing, not executable) surfaces here and leaves nothing behind for
    /// the caller to clean up.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(provider: &dyn RuntimePathProvider) -> Result<Self> {
        let spec = LaunchSpec::resolve(provider);
        debug!(command = %spec.command_line(), "launching runtime");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        // Own process group so force-kill can reach descendants.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            path: spec.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(Error::StreamCapture("stdin"))?;
        let stdout = child.stdout.take().ok_or(Error::StreamCapture("stdout"))?;
        let stderr = child.stderr.take().ok_or(Error::StreamCapture("stderr"))?;

        let pid = child.id();
        info!(pid = ?pid, runtime = %spec.program.display(), "runtime launched");

        let state = Arc::new(Mutex::new(Supervised {
            child,
            stdin: Some(stdin),
            released: false,
        }));
        let hook_id = shutdown::register(&state);

        Ok(Self {
            state,
            stdout: Some(stdout),
            stderr: Some(stderr),
            hook_id,
            pid,
        })
    }

    /// OS process id of the child, if the OS reported one at spawn.
    pub const fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the child is still alive. After disposal this is `false`.
    pub async fn is_running(&self) -> bool {
        let mut guard = self.state.lock().await;
        !guard.released && matches!(guard.child.try_wait(), Ok(None))
    }

    /// Write raw bytes to the runtime's standard input and flush.
    ///
    /// The caller frames its own messages; the bridge does not interpret
    /// the bytes.
    pub async fn write_input(&self, buf: &[u8]) -> Result<()> {
        let mut guard = self.state.lock().await;
        let stdin = guard.stdin.as_mut().ok_or(Error::Disposed)?;
        stdin.write_all(buf).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Close the input channel, signalling end-of-input to the runtime.
    ///
    /// Idempotent. Disposal does this implicitly; calling it earlier lets a
    /// consumer ask for a voluntary exit on its own schedule.
    pub async fn close_input(&self) {
        let mut guard = self.state.lock().await;
        guard.stdin.take();
    }

    /// Take the runtime's standard output channel. Yields once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the runtime's standard error channel. Yields once.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Tear the child down: close input, wait out the graceful window,
    /// force-kill the process group on timeout, release the handle.
    ///
    /// Idempotent; later calls (including ones racing the shutdown sweep)
    /// return `Ok` without touching the process again. Errors other than a
    /// child that died on its own propagate to the caller.
    pub async fn dispose(&self) -> Result<()> {
        let result = dispose_state(&self.state).await;
        if result.is_ok() {
            shutdown::unregister(self.hook_id);
        }
        result
    }
}

impl Drop for ProcessBridge {
    fn drop(&mut self) {
        shutdown::unregister(self.hook_id);

        // Backstop for bridges dropped without dispose(). Drop cannot block,
        // so this skips the graceful window and reaps nothing; the runtime
        // still must not outlive the bridge.
        let Ok(mut guard) = self.state.try_lock() else {
            return;
        };
        if guard.released {
            return;
        }
        warn!(pid = ?self.pid, "bridge dropped without dispose(), force-killing runtime");
        #[cfg(unix)]
        kill_tree(&guard.child);
        if let Err(err) = guard.child.start_kill() {
            if !is_race_exit(&err) {
                error!(pid = ?self.pid, error = %err, "backstop kill failed");
            }
        }
        guard.released = true;
    }
}

/// Disposal state machine, shared by [`ProcessBridge::dispose`] and the
/// shutdown sweep. Ordering is invariant: input closes before the wait,
/// the wait elapses before any kill, the kill precedes release.
#[allow(clippy::significant_drop_tightening)]
pub(crate) async fn dispose_state(state: &Mutex<Supervised>) -> Result<()> {
    let mut guard = state.lock().await;
    if guard.released {
        return Ok(());
    }

    // A child that already exited needs no signal: reap and release.
    match guard.child.try_wait() {
        Ok(Some(status)) => {
            debug!(?status, "runtime exited before disposal");
            guard.stdin.take();
            guard.released = true;
            return Ok(());
        }
        Ok(None) => {}
        Err(err) if is_race_exit(&err) => {
            guard.stdin.take();
            guard.released = true;
            return Ok(());
        }
        Err(err) => return Err(Error::Io(err)),
    }

    // EOF on stdin is the only graceful-shutdown signal this bridge sends;
    // there is no protocol-level quit message.
    guard.stdin.take();

    match tokio::time::timeout(GRACEFUL_EXIT_TIMEOUT, guard.child.wait()).await {
        Ok(Ok(status)) => {
            info!(?status, "runtime exited gracefully");
        }
        Ok(Err(err)) if is_race_exit(&err) => {
            debug!(error = %err, "runtime gone before wait completed");
        }
        Ok(Err(err)) => return Err(Error::Io(err)),
        Err(_elapsed) => {
            warn!(
                timeout_ms = GRACEFUL_EXIT_TIMEOUT_MS,
                "runtime ignored end-of-input, force-killing"
            );
            #[cfg(unix)]
            kill_tree(&guard.child);
            match guard.child.kill().await {
                Ok(()) => {}
                Err(err) if is_race_exit(&err) => {}
                Err(err) => return Err(Error::Io(err)),
            }
        }
    }

    guard.released = true;
    Ok(())
}

/// Take down the child's whole process group. The child was spawned as a
/// group leader, so a negative pid reaches any descendants it spawned.
#[cfg(unix)]
fn kill_tree(child: &Child) {
    let Some(pid) = child.id() else { return };
    // SAFETY: pid belongs to our own unreaped child; kill(2) against its
    // process group cannot reach unrelated processes.
    #[allow(unsafe_code)]
    #[allow(clippy::cast_possible_wrap)]
    let ret = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, error = %err, "process-group kill failed, falling back to direct kill");
        }
    }
}

/// The child terminated out-of-band between a liveness check and the next
/// OS operation on it. Treated as successful disposal, not an error.
fn is_race_exit(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::ESRCH) {
        return true;
    }
    matches!(
        err.kind(),
        std::io::ErrorKind::InvalidInput | std::io::ErrorKind::NotFound
    )
}
