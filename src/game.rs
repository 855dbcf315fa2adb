use std::str::FromStr;

use anyhow::Result;
use log::debug;
use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, Piece, Position, Role, Square, fen::Fen,
    uci::UciMove,
};

/// The authoritative game: current position, how it was reached, and the
/// positions to go back to.
#[derive(Debug, Clone)]
pub struct Game {
    initial: Chess,
    position: Chess,
    history: Vec<Chess>,
    moves: Vec<UciMove>,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Game {
        Game::from_position(Chess::default())
    }

    pub fn from_fen(fen: &str) -> Result<Game> {
        let position: Chess = Fen::from_str(fen.trim())?.into_position(CastlingMode::Standard)?;
        Ok(Game::from_position(position))
    }

    fn from_position(position: Chess) -> Game {
        Game {
            initial: position.clone(),
            position,
            history: Vec::new(),
            moves: Vec::new(),
        }
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// FEN of the current position.
    pub fn serialize(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    pub fn moves(&self) -> &[UciMove] {
        &self.moves
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn is_game_over(&self) -> bool {
        self.position.is_game_over()
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    /// Squares the piece on `origin` may legally move to, sorted and without
    /// duplicates (promotions share a destination). Castling is reported
    /// with the king's destination.
    pub fn legal_destinations(&self, origin: Square) -> Vec<Square> {
        let mut destinations: Vec<Square> = self
            .position
            .legal_moves()
            .iter()
            .filter(|m| m.from() == Some(origin))
            .filter_map(|m| match m.to_uci(CastlingMode::Standard) {
                UciMove::Normal { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        destinations.sort();
        destinations.dedup();
        destinations
    }

    /// Plays `from`-`to` if it is legal and reports whether it was.
    /// Without an explicit piece, promotions are to a queen.
    pub fn apply_move(&mut self, from: Square, to: Square, promotion: Option<Role>) -> bool {
        let candidate = |promotion| UciMove::Normal {
            from,
            to,
            promotion,
        };

        let legal = match candidate(promotion).to_move(&self.position) {
            Ok(m) => m,
            Err(_) if promotion.is_none() => {
                match candidate(Some(Role::Queen)).to_move(&self.position) {
                    Ok(m) => m,
                    Err(_) => return false,
                }
            }
            Err(_) => return false,
        };

        debug!("playing {}", legal.to_uci(CastlingMode::Standard));
        self.history.push(self.position.clone());
        self.moves.push(legal.to_uci(CastlingMode::Standard));
        self.position.play_unchecked(legal);
        true
    }

    /// Takes back the last move. Returns `false` at the initial position.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.position = previous;
                self.moves.pop();
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.position = self.initial.clone();
        self.history.clear();
        self.moves.clear();
    }
}
