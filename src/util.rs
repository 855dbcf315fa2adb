use std::{fmt, str::FromStr};

use anyhow::Result;
use serde::{Serialize, Serializer};
use shakmaty::{Role, Square, uci::UciMove};

/// A move as the engine reports it. Squares are kept in shakmaty's canonical
/// form, so `E2E4` and `e2e4` parse to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

#[cfg(test)]
impl EngineMove {
    pub fn new(from: Square, to: Square) -> Self {
        EngineMove {
            from,
            to,
            promotion: None,
        }
    }
}

impl fmt::Display for EngineMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.char())?;
        }
        Ok(())
    }
}

impl Serialize for EngineMove {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub fn parse_uci_move(move_str: &str) -> Result<UciMove> {
    let uci_move = UciMove::from_str(move_str.trim())?;

    Ok(uci_move)
}

/// Parses one engine move token. Null moves, drops and anything shorter than
/// origin + destination are rejected.
pub fn parse_engine_move(token: &str) -> Option<EngineMove> {
    if token.len() < 4 {
        return None;
    }

    match parse_uci_move(&token.to_ascii_lowercase()).ok()? {
        UciMove::Normal {
            from,
            to,
            promotion,
        } => Some(EngineMove {
            from,
            to,
            promotion,
        }),
        _ => None,
    }
}
