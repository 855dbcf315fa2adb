//! In-memory engine used by the tests: a launcher handing out duplex pipes
//! and the engine-side ends of those pipes.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, Lines, duplex,
};

use super::protocol;
use super::{WorkerChannel, WorkerLauncher};
use crate::config::EngineOptions;
use crate::error::SessionError;

pub struct FakeLauncher {
    channel: Mutex<Option<WorkerChannel>>,
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn launch(&self) -> Result<WorkerChannel, SessionError> {
        self.channel
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SessionError::WorkerUnavailable("already launched".into()))
    }
}

pub struct BrokenLauncher;

#[async_trait]
impl WorkerLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<WorkerChannel, SessionError> {
        Err(SessionError::WorkerUnavailable("no engine here".into()))
    }
}

/// The engine's side of the pipes.
pub struct FakeEngine {
    pub input: Lines<BufReader<DuplexStream>>,
    pub output: DuplexStream,
}

impl FakeEngine {
    pub async fn next_command(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.input.next_line())
            .await
            .expect("timed out waiting for a command")
            .unwrap()
    }

    pub async fn expect(&mut self, expected: &str) {
        assert_eq!(self.next_command().await.as_deref(), Some(expected));
    }

    pub async fn expect_handshake(&mut self) {
        for line in protocol::handshake_commands(&EngineOptions::default()) {
            self.expect(&line).await;
        }
    }

    /// Consumes the stop/position/go triple of one request.
    pub async fn expect_request(&mut self, fen: &str, depth: u32) {
        self.expect("stop").await;
        self.expect(&format!("position fen {fen}")).await;
        self.expect(&format!("go depth {depth}")).await;
    }

    pub async fn say(&mut self, line: &str) {
        self.output
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }
}

/// Wires a launcher whose command sink is `commands` and whose written
/// bytes come out of `engine_in`.
pub fn wire(
    commands: Box<dyn AsyncWrite + Send + Unpin>,
    engine_in: DuplexStream,
) -> (FakeLauncher, FakeEngine) {
    let (engine_out, session_out) = duplex(4096);
    let launcher = FakeLauncher {
        channel: Mutex::new(Some(WorkerChannel {
            commands,
            output: Box::new(BufReader::new(session_out)),
            process: None,
        })),
    };
    let engine = FakeEngine {
        input: BufReader::new(engine_in).lines(),
        output: engine_out,
    };
    (launcher, engine)
}

pub fn fake_worker() -> (FakeLauncher, FakeEngine) {
    let (session_in, engine_in) = duplex(4096);
    wire(Box::new(session_in), engine_in)
}
