//! Folds tagged engine events into the one snapshot the board shows.

use log::trace;
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::SessionEvent;
use crate::engine::protocol::{AnalysisEvent, Score};
use crate::util::EngineMove;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSnapshot {
    pub request_sequence: u64,
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub principal_variation: Vec<EngineMove>,
    pub best_move: Option<EngineMove>,
}

pub struct AnalysisReducer {
    active_sequence: u64,
    snapshot: AnalysisSnapshot,
    publisher: watch::Sender<AnalysisSnapshot>,
}

impl Default for AnalysisReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisReducer {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(AnalysisSnapshot::default());
        AnalysisReducer {
            active_sequence: 0,
            snapshot: AnalysisSnapshot::default(),
            publisher,
        }
    }

    pub fn snapshot(&self) -> &AnalysisSnapshot {
        &self.snapshot
    }

    /// Observers see every accepted change.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.publisher.subscribe()
    }

    /// Makes `sequence` the active request and forgets everything known
    /// about the previous one.
    pub fn begin(&mut self, sequence: u64) {
        self.active_sequence = sequence;
        self.snapshot = AnalysisSnapshot {
            request_sequence: sequence,
            ..AnalysisSnapshot::default()
        };
        self.publish();
    }

    /// Returns whether the event was accepted.
    pub fn apply(&mut self, tagged: &SessionEvent) -> bool {
        if tagged.sequence < self.active_sequence {
            trace!(
                "dropping event for superseded request #{} (active #{})",
                tagged.sequence, self.active_sequence
            );
            return false;
        }

        match &tagged.event {
            AnalysisEvent::Progress(progress) => {
                if let Some(depth) = progress.depth {
                    self.snapshot.depth = Some(depth);
                }
                if let Some(score) = progress.score {
                    self.snapshot.score = Some(score);
                }
                if let Some(pv) = &progress.principal_variation {
                    self.snapshot.principal_variation = pv.clone();
                }
            }
            AnalysisEvent::BestMove(best) => self.snapshot.best_move = Some(*best),
            AnalysisEvent::Unrecognized(_) => return false,
        }

        self.snapshot.request_sequence = tagged.sequence;
        self.publish();
        true
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot.clone());
    }
}
