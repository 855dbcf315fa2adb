use std::collections::BTreeMap;

use serde::Serialize;
use shakmaty::Square;

use crate::game::Game;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightStyle {
    Origin,
    QuietMove,
    CaptureMove,
}

/// Square styling shown while a piece is being dragged from `origin`.
/// An empty origin square yields an empty map.
pub fn compute_highlights(game: &Game, origin: Square) -> BTreeMap<Square, HighlightStyle> {
    let mut highlights = BTreeMap::new();
    let Some(moving) = game.piece_at(origin) else {
        return highlights;
    };

    highlights.insert(origin, HighlightStyle::Origin);
    for destination in game.legal_destinations(origin) {
        let style = match game.piece_at(destination) {
            Some(target) if target.color != moving.color => HighlightStyle::CaptureMove,
            _ => HighlightStyle::QuietMove,
        };
        highlights.insert(destination, style);
    }
    highlights
}
