use std::process::Stdio;

use async_trait::async_trait;
use log::info;
use tokio::io::BufReader;
use tokio::process::Command;

use super::{WorkerChannel, WorkerLauncher};
use crate::error::SessionError;

/// Launches an external UCI engine binary.
pub struct ProcessLauncher {
    path: String,
}

impl ProcessLauncher {
    pub fn new(path: impl Into<String>) -> ProcessLauncher {
        ProcessLauncher { path: path.into() }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<WorkerChannel, SessionError> {
        let mut process = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SessionError::WorkerUnavailable(format!("failed to spawn {}: {e}", self.path))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| SessionError::WorkerUnavailable("engine stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| SessionError::WorkerUnavailable("engine stdout not captured".into()))?;

        info!("started engine process {} (pid {:?})", self.path, process.id());

        Ok(WorkerChannel {
            commands: Box::new(stdin),
            output: Box::new(BufReader::new(stdout)),
            process: Some(process),
        })
    }
}
