mod process;
pub mod protocol;
mod session;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::process::Child;

use crate::error::SessionError;

pub use process::ProcessLauncher;
pub use session::{AnalysisEvents, EngineSession, SessionEvent};

/// Both ends of a running analysis worker.
pub struct WorkerChannel {
    pub commands: Box<dyn AsyncWrite + Send + Unpin>,
    pub output: Box<dyn AsyncBufRead + Send + Unpin>,
    /// Held so the process lives exactly as long as the channel.
    pub process: Option<Child>,
}

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self) -> Result<WorkerChannel, SessionError>;
}
