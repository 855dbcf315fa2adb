//! Owns one analysis worker for its whole lifetime and keeps at most one
//! request active on it.
//!
//! A single actor task holds the worker. `analyze`/`stop` only enqueue
//! commands, so callers never wait on the engine; the actor writes them in
//! order and forwards every output line, parsed, to one subscriber.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::{self, AnalysisEvent, AnalysisRequest};
use super::{WorkerChannel, WorkerLauncher};
use crate::config::EngineOptions;

const QUIT_GRACE: Duration = Duration::from_millis(500);

/// A parsed worker line, tagged with the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub sequence: u64,
    pub event: AnalysisEvent,
}

/// The session's single subscriber end. Ends when the worker is gone.
pub struct AnalysisEvents {
    rx: mpsc::Receiver<SessionEvent>,
}

impl Stream for AnalysisEvents {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SessionEvent>> {
        self.rx.poll_recv(cx)
    }
}

enum Command {
    Analyze(AnalysisRequest),
    Stop,
    Quit,
}

pub struct EngineSession {
    commands: Option<mpsc::UnboundedSender<Command>>,
    actor: Option<JoinHandle<()>>,
    sequence: u64,
}

impl EngineSession {
    /// Launches the worker and sends the configuration handshake. A worker
    /// that cannot be launched is logged once and yields a session whose
    /// operations do nothing and whose event stream is already closed.
    pub async fn start<L>(
        launcher: &L,
        options: &EngineOptions,
        event_capacity: usize,
    ) -> (EngineSession, AnalysisEvents)
    where
        L: WorkerLauncher + ?Sized,
    {
        let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
        let events = AnalysisEvents { rx: event_rx };

        let channel = match launcher.launch().await {
            Ok(channel) => channel,
            Err(e) => {
                error!("{e}; continuing without analysis");
                return (EngineSession::disabled(), events);
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let worker = Worker::new(channel, event_tx);
        let actor = tokio::spawn(worker.run(protocol::handshake_commands(options), command_rx));

        let session = EngineSession {
            commands: Some(command_tx),
            actor: Some(actor),
            sequence: 0,
        };
        (session, events)
    }

    fn disabled() -> EngineSession {
        EngineSession {
            commands: None,
            actor: None,
            sequence: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.commands.is_some()
    }

    /// Sequence of the newest request, 0 before the first one.
    pub fn active_sequence(&self) -> u64 {
        self.sequence
    }

    /// Supersedes whatever is running with a fresh request and returns its
    /// sequence number, or `None` when there is no worker.
    pub fn analyze(&mut self, position: impl Into<String>, depth: u32) -> Option<u64> {
        let commands = self.commands.as_ref()?;
        let request = AnalysisRequest {
            sequence: self.sequence + 1,
            position: position.into(),
            depth,
        };
        if commands.send(Command::Analyze(request)).is_err() {
            warn!("engine worker has exited, analysis disabled");
            self.commands = None;
            return None;
        }
        self.sequence += 1;
        Some(self.sequence)
    }

    /// Pauses the current search without superseding it.
    pub fn stop(&self) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Stop);
        }
    }

    /// Quits the worker and waits until it is released.
    pub async fn terminate(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Quit);
        }
        if let Some(actor) = self.actor.take() {
            if let Err(e) = actor.await {
                warn!("engine actor ended abnormally: {e}");
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        // the worker's child process is killed when the aborted task drops it
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
    }
}

struct Worker {
    commands: Box<dyn AsyncWrite + Send + Unpin>,
    lines: Lines<Box<dyn AsyncBufRead + Send + Unpin>>,
    process: Option<Child>,
    /// Dropped once the engine's output ends, closing the subscriber's stream.
    events: Option<mpsc::Sender<SessionEvent>>,
    /// Searches started with `go` that have not answered with `bestmove` yet.
    pending: VecDeque<u64>,
    last_issued: u64,
}

impl Worker {
    fn new(channel: WorkerChannel, events: mpsc::Sender<SessionEvent>) -> Worker {
        Worker {
            commands: channel.commands,
            lines: channel.output.lines(),
            process: channel.process,
            events: Some(events),
            pending: VecDeque::new(),
            last_issued: 0,
        }
    }

    async fn run(mut self, handshake: Vec<String>, mut commands: mpsc::UnboundedReceiver<Command>) {
        // options are independent, one that fails to apply does not stop the rest
        for line in &handshake {
            if let Err(e) = self.send(line).await {
                warn!("engine handshake command {line:?} failed: {e}");
            }
        }

        let mut reading = true;
        loop {
            tokio::select! {
                command = commands.recv() => {
                    if !self.handle(command).await {
                        break;
                    }
                }
                line = self.lines.next_line(), if reading => match line {
                    Ok(Some(line)) => {
                        if !self.deliver(&line, &mut commands).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        warn!("engine closed its output");
                        reading = false;
                        self.events = None;
                    }
                    Err(e) => {
                        warn!("failed to read engine output: {e}");
                        reading = false;
                        self.events = None;
                    }
                },
            }
        }

        self.shutdown().await;
    }

    /// Returns `false` once the session asked the worker to quit.
    async fn handle(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Analyze(request)) => self.issue(request).await,
            Some(Command::Stop) => {
                if let Err(e) = self.send(&protocol::stop_command()).await {
                    warn!("failed to send stop: {e}");
                }
            }
            Some(Command::Quit) | None => return false,
        }
        true
    }

    async fn send(&mut self, line: &str) -> std::io::Result<()> {
        debug!("engine < {line}");
        self.commands.write_all(format!("{line}\n").as_bytes()).await?;
        self.commands.flush().await
    }

    async fn issue(&mut self, request: AnalysisRequest) {
        self.last_issued = request.sequence;
        for line in protocol::serialize_request(&request) {
            if let Err(e) = self.send(&line).await {
                warn!("analysis request #{} not sent: {e}", request.sequence);
                return;
            }
        }
        self.pending.push_back(request.sequence);
    }

    /// Forwards one output line. While the subscriber is not keeping up,
    /// commands are still served, and a quit abandons the pending event.
    async fn deliver(
        &mut self,
        line: &str,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> bool {
        debug!("engine > {line}");
        let sequence = self.pending.front().copied().unwrap_or(self.last_issued);
        if protocol::ends_search(line) {
            self.pending.pop_front();
        }

        let Some(events) = self.events.clone() else {
            return true;
        };
        let event = SessionEvent {
            sequence,
            event: protocol::parse_line(line),
        };
        let send = events.send(event);
        tokio::pin!(send);
        loop {
            tokio::select! {
                // a dropped subscriber is not an error for the worker
                _ = &mut send => return true,
                command = commands.recv() => {
                    if !self.handle(command).await {
                        debug!("dropping event for #{sequence} on quit");
                        return false;
                    }
                }
            }
        }
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.send(&protocol::quit_command()).await {
            debug!("quit not delivered: {e}");
        }
        let _ = self.commands.shutdown().await;

        if let Some(mut process) = self.process.take() {
            match tokio::time::timeout(QUIT_GRACE, process.wait()).await {
                Ok(Ok(status)) => info!("engine exited with {status}"),
                Ok(Err(e)) => warn!("failed to wait for engine: {e}"),
                Err(_) => {
                    warn!("engine ignored quit, killing it");
                    let _ = process.kill().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{BrokenLauncher, fake_worker, wire};
    use crate::util::parse_engine_move;
    use futures::StreamExt;
    use std::io;
    use tokio::io::{DuplexStream, duplex};

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const BARE_KINGS: &str = "4k3/8/8/8/8/8/8/4K3 w - - 0 1";

    /// Rejects any write that mentions `Threads`, like an engine build
    /// without thread support would.
    struct NoThreads(DuplexStream);

    impl AsyncWrite for NoThreads {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if buf.windows(7).any(|w| w == b"Threads") {
                return Poll::Ready(Err(io::Error::other("unsupported option")));
            }
            Pin::new(&mut self.0).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_shutdown(cx)
        }
    }

    async fn next_event(events: &mut AnalysisEvents) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream closed")
    }

    #[tokio::test]
    async fn handshake_is_sent_on_start() {
        let (launcher, mut engine) = fake_worker();
        let (session, _events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        assert!(session.is_available());
        engine.expect_handshake().await;
    }

    #[tokio::test]
    async fn failed_option_does_not_abort_handshake() {
        let (session_in, engine_in) = duplex(4096);
        let (launcher, mut engine) = wire(Box::new(NoThreads(session_in)), engine_in);
        let (_session, _events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;

        engine.expect("uci").await;
        engine.expect("setoption name Hash value 32").await;
        engine.expect("setoption name Skill Level value 20").await;
        engine.expect("setoption name MultiPV value 1").await;
        engine.expect("setoption name Move Overhead value 100").await;
    }

    #[tokio::test]
    async fn analyze_stops_then_sets_position_then_searches() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, _events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        engine.expect_handshake().await;

        assert_eq!(session.analyze(START_FEN, 25), Some(1));
        assert_eq!(session.analyze(BARE_KINGS, 12), Some(2));
        assert_eq!(session.active_sequence(), 2);

        engine.expect("stop").await;
        engine.expect(&format!("position fen {START_FEN}")).await;
        engine.expect("go depth 25").await;
        engine.expect("stop").await;
        engine.expect(&format!("position fen {BARE_KINGS}")).await;
        engine.expect("go depth 12").await;
    }

    #[tokio::test]
    async fn bare_stop_keeps_the_sequence() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, _events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        engine.expect_handshake().await;

        session.analyze(START_FEN, 5);
        session.stop();
        assert_eq!(session.active_sequence(), 1);

        engine.expect_request(START_FEN, 5).await;
        engine.expect("stop").await;
    }

    #[tokio::test]
    async fn late_output_is_tagged_with_the_search_that_produced_it() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, mut events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        engine.expect_handshake().await;

        session.analyze(START_FEN, 25);
        engine.expect_request(START_FEN, 25).await;
        session.analyze(BARE_KINGS, 25);
        engine.expect_request(BARE_KINGS, 25).await;

        // the first search only now reacts to its stop
        engine.say("info depth 14 score cp 20 pv e2e4").await;
        engine.say("bestmove e2e4 ponder e7e5").await;
        engine.say("info depth 1 score cp 0 pv e1d2").await;
        engine.say("bestmove e1d2").await;

        assert_eq!(next_event(&mut events).await.sequence, 1);
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent {
                sequence: 1,
                event: AnalysisEvent::BestMove(parse_engine_move("e2e4").unwrap()),
            }
        );
        assert_eq!(next_event(&mut events).await.sequence, 2);
        assert_eq!(next_event(&mut events).await.sequence, 2);
    }

    #[tokio::test]
    async fn unusable_bestmove_still_retires_its_search() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, mut events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        engine.expect_handshake().await;

        session.analyze(START_FEN, 3);
        engine.expect_request(START_FEN, 3).await;
        session.analyze(BARE_KINGS, 3);
        engine.expect_request(BARE_KINGS, 3).await;

        engine.say("bestmove (none)").await;
        engine.say("bestmove e1e2").await;

        assert_eq!(next_event(&mut events).await.sequence, 1);
        assert_eq!(next_event(&mut events).await.sequence, 2);
    }

    #[tokio::test]
    async fn unrecognized_lines_are_still_delivered_in_order() {
        let (launcher, mut engine) = fake_worker();
        let (_session, mut events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        engine.expect_handshake().await;

        engine.say("id name FakeFish").await;
        engine.say("uciok").await;

        assert_eq!(
            next_event(&mut events).await.event,
            AnalysisEvent::Unrecognized("id name FakeFish".into())
        );
        assert_eq!(
            next_event(&mut events).await.event,
            AnalysisEvent::Unrecognized("uciok".into())
        );
    }

    #[tokio::test]
    async fn terminate_quits_and_disables_the_session() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, mut events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 8).await;
        engine.expect_handshake().await;

        session.terminate().await;
        engine.expect("quit").await;

        assert!(!session.is_available());
        assert_eq!(session.analyze(START_FEN, 10), None);
        session.stop();
        session.terminate().await;
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn terminate_returns_while_nobody_reads_events() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, _events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 2).await;
        engine.expect_handshake().await;

        session.analyze(START_FEN, 30);
        engine.expect_request(START_FEN, 30).await;
        for depth in 1..=9 {
            engine.say(&format!("info depth {depth} score cp {depth} pv e2e4")).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(3), session.terminate())
            .await
            .expect("terminate blocked on a full event buffer");
        engine.expect("quit").await;
    }

    #[tokio::test]
    async fn commands_are_served_while_the_subscriber_lags() {
        let (launcher, mut engine) = fake_worker();
        let (mut session, mut events) =
            EngineSession::start(&launcher, &EngineOptions::default(), 1).await;
        engine.expect_handshake().await;

        session.analyze(START_FEN, 30);
        engine.expect_request(START_FEN, 30).await;
        for depth in 1..=4 {
            engine.say(&format!("info depth {depth} pv e2e4")).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.analyze(BARE_KINGS, 6);
        engine.expect_request(BARE_KINGS, 6).await;
        assert_eq!(next_event(&mut events).await.sequence, 1);
    }

    #[tokio::test]
    async fn unavailable_worker_degrades_to_no_op() {
        let (mut session, mut events) =
            EngineSession::start(&BrokenLauncher, &EngineOptions::default(), 8).await;

        assert!(!session.is_available());
        assert_eq!(session.analyze(START_FEN, 10), None);
        assert_eq!(session.active_sequence(), 0);
        session.stop();
        session.terminate().await;
        assert!(events.next().await.is_none());
    }
}
