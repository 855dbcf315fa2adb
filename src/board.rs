use std::collections::BTreeMap;

use log::info;
use shakmaty::{Color, Role, Square};
use tokio::sync::watch;

use crate::analysis::{AnalysisReducer, AnalysisSnapshot};
use crate::engine::{EngineSession, SessionEvent};
use crate::game::Game;
use crate::highlight::{self, HighlightStyle};

/// Ties the game to its live analysis: every position change supersedes the
/// running request and resets the snapshot in the same step.
pub struct AnalysisBoard {
    game: Game,
    session: EngineSession,
    reducer: AnalysisReducer,
    depth: u32,
    orientation: Color,
}

impl AnalysisBoard {
    pub fn new(game: Game, session: EngineSession, depth: u32) -> AnalysisBoard {
        AnalysisBoard {
            game,
            session,
            reducer: AnalysisReducer::new(),
            depth,
            orientation: Color::White,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The side the board is drawn from.
    pub fn orientation(&self) -> Color {
        self.orientation
    }

    /// Turns the board around. Neither the game nor the analysis changes.
    pub fn flip(&mut self) -> Color {
        self.orientation = !self.orientation;
        self.orientation
    }

    pub fn has_engine(&self) -> bool {
        self.session.is_available()
    }

    pub fn snapshot(&self) -> &AnalysisSnapshot {
        self.reducer.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.reducer.subscribe()
    }

    /// Starts analysing the current position. `None` when there is no engine.
    pub fn request_analysis(&mut self) -> Option<u64> {
        let sequence = self.session.analyze(self.game.serialize(), self.depth)?;
        self.reducer.begin(sequence);
        Some(sequence)
    }

    /// Plays a move from the board. Illegal moves leave everything as it was.
    pub fn play(&mut self, from: Square, to: Square, promotion: Option<Role>) -> bool {
        if !self.game.apply_move(from, to, promotion) {
            return false;
        }
        self.request_analysis();
        true
    }

    pub fn undo(&mut self) -> bool {
        if !self.game.undo() {
            return false;
        }
        self.request_analysis();
        true
    }

    pub fn reset(&mut self) {
        self.game.reset();
        self.request_analysis();
    }

    pub fn pause(&self) {
        self.session.stop();
    }

    pub fn highlights(&self, origin: Square) -> BTreeMap<Square, HighlightStyle> {
        highlight::compute_highlights(&self.game, origin)
    }

    pub fn handle_event(&mut self, event: &SessionEvent) -> bool {
        self.reducer.apply(event)
    }

    pub async fn shutdown(mut self) {
        info!(
            "shutting down after {} moves and {} analysis requests",
            self.game.moves().len(),
            self.session.active_sequence()
        );
        self.session.terminate().await;
    }
}
