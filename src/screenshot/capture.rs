//! Active-window capture through an external command.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::ScreenCapture;

/// How long a timed-out capture process gets to exit after SIGTERM.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Runs `<program> <args..> <output>` and checks that it produced the file.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
}

impl CommandCapture {
    /// `scrot -u <output>` with the given timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_command("scrot", ["-u"], timeout)
    }

    /// A custom capture command. The output path is appended as the last argument.
    #[must_use]
    pub fn with_command<I, S>(program: impl Into<OsString>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture(&self, output: &Path) -> bool {
        if let Some(parent) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "Cannot create capture directory");
                return false;
            }
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(program = ?self.program, error = %e, "Failed to start capture command");
                return false;
            }
        };

        match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(status = %status, "Capture command exited");
                status.success() && tokio::fs::metadata(output).await.is_ok()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Waiting for capture command failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Capture command timed out");
                stop(&mut child).await;
                false
            }
        }
    }
}

/// SIGTERM, then SIGKILL if the child ignores it.
async fn stop(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        if let Ok(pid) = i32::try_from(pid) {
            terminate(pid);
            if timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
                return;
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill capture command");
    }
}

#[cfg(unix)]
fn terminate(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => debug!(pid, "Sent SIGTERM to capture command"),
        Err(nix::Error::ESRCH) => debug!(pid, "Capture command already exited"),
        Err(e) => warn!(pid, error = %e, "Failed to send SIGTERM to capture command"),
    }
}
