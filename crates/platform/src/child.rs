//! Child process termination shared by helper processes and monitored commands.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Ask `child` to exit with SIGTERM, then SIGKILL it once `grace` runs out.
///
/// Always reaps the child. Returns immediately if it already exited.
pub fn terminate_gracefully(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    send_sigterm(child.id())?;

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }

    tracing::warn!(pid = child.id(), "child ignored SIGTERM, killing");
    child.kill()?;
    child.wait()
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> io::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // ESRCH: exited between try_wait and kill.
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_terminates_sleeping_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = Instant::now();

        let status = terminate_gracefully(&mut child, Duration::from_secs(5)).unwrap();

        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_already_exited_child() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().unwrap();

        let status = terminate_gracefully(&mut child, Duration::from_millis(10)).unwrap();
        assert!(status.success());
    }
}
