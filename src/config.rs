//! Runtime configuration read from environment variables.

use std::{env, str::FromStr};

use log::warn;

/// Fixed option set sent to the engine during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    pub hash_size_mb: u32,
    pub thread_count: u32,
    pub skill_level: u32,
    pub multi_pv_count: u32,
    pub move_overhead_ms: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            hash_size_mb: 32,
            thread_count: 1,
            skill_level: 20,
            multi_pv_count: 1,
            move_overhead_ms: 100,
        }
    }
}

impl EngineOptions {
    /// UCI option names paired with their values, in handshake order.
    pub fn as_uci_options(&self) -> Vec<(&'static str, u32)> {
        vec![
            ("Hash", self.hash_size_mb),
            ("Threads", self.thread_count),
            ("Skill Level", self.skill_level),
            ("MultiPV", self.multi_pv_count),
            ("Move Overhead", self.move_overhead_ms),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Path (or name on PATH) of the UCI engine binary
    pub engine_path: String,

    /// Depth requested for every analysis
    pub analysis_depth: u32,

    pub engine_options: EngineOptions,

    /// Position to start from instead of the standard one
    pub start_fen: Option<String>,

    pub snapshot_format: SnapshotFormat,

    /// Capacity of the channel between the engine reader and the reducer
    pub event_buffer: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = EngineOptions::default();

        let snapshot_format = match env::var("SNAPSHOT_FORMAT").as_deref() {
            Ok("json") => SnapshotFormat::Json,
            Ok("text") | Err(_) => SnapshotFormat::Text,
            Ok(other) => {
                warn!("unknown SNAPSHOT_FORMAT {other:?}, using text");
                SnapshotFormat::Text
            }
        };

        AppConfig {
            engine_path: env::var("ENGINE_PATH").unwrap_or_else(|_| "stockfish".to_string()),
            analysis_depth: env_or("ANALYSIS_DEPTH", 25),
            engine_options: EngineOptions {
                hash_size_mb: env_or("ENGINE_HASH_MB", defaults.hash_size_mb),
                thread_count: env_or("ENGINE_THREADS", defaults.thread_count),
                skill_level: env_or("ENGINE_SKILL_LEVEL", defaults.skill_level),
                multi_pv_count: env_or("ENGINE_MULTIPV", defaults.multi_pv_count),
                move_overhead_ms: env_or("ENGINE_MOVE_OVERHEAD_MS", defaults.move_overhead_ms),
            },
            start_fen: env::var("START_FEN").ok().filter(|f| !f.trim().is_empty()),
            snapshot_format,
            event_buffer: env_or("EVENT_BUFFER", 256usize).max(1),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr>(key: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("{key}={raw:?} is not a valid value, using default");
        default
    })
}
