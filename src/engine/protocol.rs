//! Text protocol spoken with the analysis worker: outbound command lines and
//! inbound progress reports. Everything here is pure.

use serde::Serialize;

use crate::config::EngineOptions;
use crate::util::{EngineMove, parse_engine_move};

/// Evaluation from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Centipawn(i32),
    /// Signed mate distance exactly as reported, never clamped.
    MateIn(i32),
}

/// Partial search progress. Only the fields present on the line are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub principal_variation: Option<Vec<EngineMove>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    BestMove(EngineMove),
    Progress(Progress),
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub sequence: u64,
    /// Serialized position (FEN).
    pub position: String,
    pub depth: u32,
}

pub fn stop_command() -> String {
    "stop".to_string()
}

pub fn quit_command() -> String {
    "quit".to_string()
}

/// `uci` followed by one independent `setoption` per configured option.
pub fn handshake_commands(options: &EngineOptions) -> Vec<String> {
    let mut commands = vec!["uci".to_string()];
    commands.extend(
        options
            .as_uci_options()
            .into_iter()
            .map(|(name, value)| format!("setoption name {name} value {value}")),
    );
    commands
}

/// Stop must precede the new position: replacing the position under a
/// running search corrupts the engine's state.
pub fn serialize_request(request: &AnalysisRequest) -> Vec<String> {
    vec![
        stop_command(),
        format!("position fen {}", request.position),
        format!("go depth {}", request.depth),
    ]
}

/// Every `go` is answered by exactly one `bestmove` line, usable or not.
pub fn ends_search(line: &str) -> bool {
    line.split_whitespace().next() == Some("bestmove")
}

pub fn parse_line(line: &str) -> AnalysisEvent {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("bestmove") => match tokens.next().and_then(parse_engine_move) {
            Some(best) => AnalysisEvent::BestMove(best),
            None => AnalysisEvent::Unrecognized(line.to_string()),
        },
        Some("info") => {
            let progress = parse_info(tokens.collect());
            if progress == Progress::default() {
                AnalysisEvent::Unrecognized(line.to_string())
            } else {
                AnalysisEvent::Progress(progress)
            }
        }
        _ => AnalysisEvent::Unrecognized(line.to_string()),
    }
}

fn parse_info(tokens: Vec<&str>) -> Progress {
    let mut progress = Progress::default();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                if let Some(depth) = tokens.get(i + 1).and_then(|t| t.parse().ok()) {
                    progress.depth = Some(depth);
                    i += 1;
                }
            }
            "score" => {
                let value = tokens.get(i + 2).and_then(|t| t.parse::<i32>().ok());
                let score = match (tokens.get(i + 1), value) {
                    (Some(&"cp"), Some(v)) => Some(Score::Centipawn(v)),
                    (Some(&"mate"), Some(v)) => Some(Score::MateIn(v)),
                    _ => None,
                };
                if score.is_some() {
                    progress.score = score;
                    i += 2;
                }
            }
            "pv" => {
                let moves: Vec<EngineMove> = tokens[i + 1..]
                    .iter()
                    .map_while(|t| parse_engine_move(t))
                    .collect();
                i += moves.len();
                if !moves.is_empty() {
                    progress.principal_variation = Some(moves);
                }
            }
            // free text runs to the end of the line
            "string" => break,
            _ => {}
        }
        i += 1;
    }
    progress
}
