//! Text rendering of the board state and the analysis snapshot. Clamping
//! and rounding happen here and nowhere below.

use std::collections::BTreeMap;

use shakmaty::{Color, File, Position, Rank, Square};

use crate::analysis::AnalysisSnapshot;
use crate::engine::protocol::Score;
use crate::game::Game;
use crate::highlight::HighlightStyle;
use crate::util::EngineMove;

const BAR_CLAMP_CP: i32 = 1000;
const MATE_AS_CP: i32 = 10_000;
const BAR_WIDTH: usize = 20;

/// How much of the eval bar is white's, in percent (50 = equal).
pub fn eval_bar_percent(score: Option<Score>) -> f32 {
    let cp = match score {
        Some(Score::Centipawn(cp)) => cp,
        Some(Score::MateIn(n)) if n > 0 => MATE_AS_CP,
        Some(Score::MateIn(_)) => -MATE_AS_CP,
        None => 0,
    };
    50.0 + cp.clamp(-BAR_CLAMP_CP, BAR_CLAMP_CP) as f32 / 20.0
}

pub fn format_score(score: Option<Score>) -> String {
    match score {
        Some(Score::Centipawn(cp)) => format!("{:+.2}", cp as f64 / 100.0),
        Some(Score::MateIn(n)) if n > 0 => format!("M{n}"),
        Some(Score::MateIn(n)) => format!("-M{}", n.abs()),
        None => "-".to_string(),
    }
}

pub fn format_best_move(best: Option<EngineMove>) -> String {
    match best {
        Some(m) => format!(
            "{} -> {}",
            m.from.to_string().to_uppercase(),
            m.to.to_string().to_uppercase()
        ),
        None => "calculating...".to_string(),
    }
}

pub fn format_depth(depth: Option<u32>, target: u32) -> String {
    format!("{} / {target}", depth.unwrap_or(0))
}

pub fn format_pv(pv: &[EngineMove]) -> String {
    pv.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn eval_bar(score: Option<Score>) -> String {
    let filled = (eval_bar_percent(score) / 100.0 * BAR_WIDTH as f32).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

pub fn render_snapshot(snapshot: &AnalysisSnapshot, target_depth: u32) -> String {
    format!(
        "#{:<3} {} {:>7}  depth {:<9} best {:<15} pv {}",
        snapshot.request_sequence,
        eval_bar(snapshot.score),
        format_score(snapshot.score),
        format_depth(snapshot.depth, target_depth),
        format_best_move(snapshot.best_move),
        format_pv(&snapshot.principal_variation),
    )
}

pub fn render_highlights(highlights: &BTreeMap<Square, HighlightStyle>) -> String {
    if highlights.is_empty() {
        return "nothing to move there".to_string();
    }
    highlights
        .iter()
        .map(|(square, style)| {
            let tag = match style {
                HighlightStyle::Origin => "origin",
                HighlightStyle::QuietMove => "move",
                HighlightStyle::CaptureMove => "capture",
            };
            format!("{square}:{tag}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Draws the board as seen from `orientation`'s side.
pub fn render_board(game: &Game, orientation: Color) -> String {
    let (ranks, files): (Vec<Rank>, Vec<File>) = match orientation {
        Color::White => (Rank::ALL.into_iter().rev().collect(), File::ALL.to_vec()),
        Color::Black => (Rank::ALL.to_vec(), File::ALL.into_iter().rev().collect()),
    };

    let mut out = String::new();
    for &rank in &ranks {
        out.push(rank.char());
        out.push(' ');
        for &file in &files {
            let square = Square::from_coords(file, rank);
            let c = game.piece_at(square).map_or('.', |p| p.char());
            out.push(c);
            out.push(' ');
        }
        out.push('\n');
    }
    out.push(' ');
    for file in files {
        out.push(' ');
        out.push(file.char());
    }
    out.push('\n');
    out.push_str(&status_line(game));
    out
}

pub fn status_line(game: &Game) -> String {
    let position = game.position();
    let side = match game.turn() {
        Color::White => "white",
        Color::Black => "black",
    };
    if position.is_checkmate() {
        format!("checkmate, {side} is mated")
    } else if position.is_stalemate() {
        "stalemate".to_string()
    } else if game.is_game_over() {
        "draw".to_string()
    } else if position.is_check() {
        format!("{side} to move, in check")
    } else {
        format!("{side} to move")
    }
}
