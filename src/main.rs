mod analysis;
mod board;
mod config;
mod display;
mod engine;
mod error;
mod game;
mod highlight;
mod util;

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use env_logger::{Env, Target};
use futures::StreamExt;
use log::{info, warn};
use shakmaty::{Square, uci::UciMove};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::analysis::AnalysisSnapshot;
use crate::board::AnalysisBoard;
use crate::config::{AppConfig, SnapshotFormat};
use crate::engine::{EngineSession, ProcessLauncher};
use crate::game::Game;
use util::parse_uci_move;

const HELP: &str = "commands: <move> (e2e4, e7e8n) | hints <square> | undo | reset | stop | go \
                    | board | flip | fen | help | quit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Move(UciMove),
    Hints(Square),
    Undo,
    Reset,
    Stop,
    Go,
    Board,
    Flip,
    Fen,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };

    let input = match first.to_ascii_lowercase().as_str() {
        "hints" | "h" => {
            let Some(square) = words.next() else {
                bail!("hints needs a square, e.g. `hints e2`");
            };
            Input::Hints(Square::from_str(&square.to_ascii_lowercase())?)
        }
        "undo" => Input::Undo,
        "reset" => Input::Reset,
        "stop" => Input::Stop,
        "go" => Input::Go,
        "board" => Input::Board,
        "flip" => Input::Flip,
        "fen" => Input::Fen,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => Input::Move(
            parse_uci_move(other)
                .with_context(|| format!("`{first}` is neither a command nor a move"))?,
        ),
    };
    Ok(Some(input))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logs go to stderr so the board on stdout stays readable
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let config = AppConfig::from_env();
    let game = match &config.start_fen {
        Some(fen) => {
            info!("Initial FEN: {fen}");
            Game::from_fen(fen)
                .with_context(|| format!("START_FEN is not a valid position: {fen}"))?
        }
        None => Game::new(),
    };

    let launcher = ProcessLauncher::new(&config.engine_path);
    let (session, mut events) =
        EngineSession::start(&launcher, &config.engine_options, config.event_buffer).await;
    let mut board = AnalysisBoard::new(game, session, config.analysis_depth);

    let renderer = spawn_renderer(board.subscribe(), config.snapshot_format, board.depth());
    println!("{}", display::render_board(board.game(), board.orientation()));
    println!("{HELP}");
    if !board.has_engine() {
        println!("no engine at {}, playing without analysis", config.engine_path);
    }
    board.request_analysis();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut engine_alive = true;
    loop {
        tokio::select! {
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if !handle_input(&mut board, &line) {
                        break;
                    }
                }
                None => break,
            },
            event = events.next(), if engine_alive => match event {
                Some(event) => {
                    board.handle_event(&event);
                }
                None => {
                    warn!("engine is gone, analysis stopped");
                    engine_alive = false;
                }
            },
        }
    }

    info!(
        "last analysis: {}",
        display::render_snapshot(board.snapshot(), board.depth())
    );
    // nobody reads engine output past this point
    drop(events);
    board.shutdown().await;
    if let Err(e) = renderer.await {
        warn!("snapshot renderer ended abnormally: {e}");
    }
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn handle_input(board: &mut AnalysisBoard, line: &str) -> bool {
    let input = match parse_input(line) {
        Ok(Some(input)) => input,
        Ok(None) => return true,
        Err(e) => {
            println!("{e}");
            return true;
        }
    };

    match input {
        Input::Move(uci) => {
            let UciMove::Normal {
                from,
                to,
                promotion,
            } = &uci
            else {
                println!("only board moves can be played");
                return true;
            };
            if board.play(*from, *to, *promotion) {
                println!("{}", display::render_board(board.game(), board.orientation()));
            } else {
                println!("illegal move {uci}");
            }
        }
        Input::Hints(square) => {
            println!("{}", display::render_highlights(&board.highlights(square)))
        }
        Input::Undo => {
            if board.undo() {
                println!("{}", display::render_board(board.game(), board.orientation()));
            } else {
                println!("nothing to undo");
            }
        }
        Input::Reset => {
            board.reset();
            println!("{}", display::render_board(board.game(), board.orientation()));
        }
        Input::Stop => board.pause(),
        Input::Go => {
            if board.request_analysis().is_none() {
                println!("no engine available");
            }
        }
        Input::Flip => {
            board.flip();
            println!("{}", display::render_board(board.game(), board.orientation()));
        }
        Input::Board => println!("{}", display::render_board(board.game(), board.orientation())),
        Input::Fen => println!("{}", board.game().serialize()),
        Input::Help => println!("{HELP}"),
        Input::Quit => return false,
    }
    true
}

fn spawn_renderer(
    mut snapshots: watch::Receiver<AnalysisSnapshot>,
    format: SnapshotFormat,
    target_depth: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            match format {
                SnapshotFormat::Text => {
                    println!("{}", display::render_snapshot(&snapshot, target_depth))
                }
                SnapshotFormat::Json => match serde_json::to_string(&snapshot) {
                    Ok(json) => println!("{json}"),
                    Err(e) => warn!("failed to encode snapshot: {e}"),
                },
            }
        }
    })
}
