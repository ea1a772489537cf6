use std::io;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

use pidwatt_platform::terminate_gracefully;

use super::orchestrator::Target;
use super::SessionError;

/// A command spawned for monitoring.
pub struct MonitoredProcess {
    child: Child,
    program: String,
    grace: Duration,
    exit_status: Option<ExitStatus>,
}

impl MonitoredProcess {
    pub fn spawn(program: &str, args: &[String], grace: Duration) -> Result<Self, SessionError> {
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|source| SessionError::Launch {
                program: program.to_string(),
                source,
            })?;

        tracing::info!(program, pid = child.id(), "launched monitored command");

        Ok(Self {
            child,
            program: program.to_string(),
            grace,
            exit_status: None,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Non-blocking exit check; reaps the child once it has exited.
    pub fn try_status(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        Ok(self.exit_status)
    }

    /// Block until the command exits.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.exit_status = Some(status);
        Ok(status)
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}

impl Target for MonitoredProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.try_status()?.is_some())
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.exit_status.is_some() {
            return Ok(());
        }
        let status = terminate_gracefully(&mut self.child, self.grace)?;
        self.exit_status = Some(status);
        Ok(())
    }
}
