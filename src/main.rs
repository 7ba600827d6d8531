// src/main.rs
//! Line-oriented console client talking to the game server over a WebSocket.
//! Lines starting with `{` are injected as if the server had sent them.

use regex::Regex;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;

use chess_session::{
    ClientConfig, Color, ConnectionState, GameSession, MatchState, MoveIntent, PieceType, SaveLoadError,
    SelectOutcome, SessionEvent, SocketEvent, Square, WsTransport,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type ConsoleSession = GameSession<WsTransport>;

/// Everything the main loop waits on: typed lines and the socket.
enum ConsoleInput {
    Line(String),
    Socket(SocketEvent),
    Eof,
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error("Unknown command: '{0}'. Type 'help' for commands.")]
    UnknownCommand(String),
    #[error("Missing argument for command: '{0}'")]
    MissingArgument(&'static str),
    #[error("Invalid argument: '{0}'")]
    InvalidArgument(String),
    #[error("Export error: {0}")]
    Export(#[from] SaveLoadError),
}

// --- Input Parsing ---

#[derive(Debug, PartialEq)]
enum Command {
    Connect,
    Disconnect,
    Play,
    Select(Square),
    /// Both squares at once, e.g. `e2e4` or `a7a8q`.
    Move(MoveIntent),
    Promote(PieceType),
    Cancel,
    Board,
    History,
    Status,
    Export(Option<String>),
    Reset,
    Help,
    Quit,
    /// A raw server frame to feed into the session.
    Frame(String),
}

struct CommandParser {
    command: Regex,
    square: Regex,
    lan: Regex,
}

impl CommandParser {
    fn new() -> Result<Self, regex::Error> {
        Ok(CommandParser {
            command: Regex::new(r"^([A-Za-z?]+)(?:\s+(\S+))?$")?,
            square: Regex::new(r"^[a-hA-H][1-8]$")?,
            lan: Regex::new(r"^[a-hA-H][1-8][a-hA-H][1-8][qrbnQRBN]?$")?,
        })
    }

    fn parse(&self, input: &str) -> Result<Command, CommandError> {
        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            return Ok(Command::Frame(trimmed.to_string()));
        }
        // A bare square is shorthand for `select`
        if self.square.is_match(trimmed) {
            return self.parse_square(trimmed).map(Command::Select);
        }
        if self.lan.is_match(trimmed) {
            return MoveIntent::parse_lan(&trimmed.to_lowercase())
                .map(Command::Move)
                .ok_or_else(|| CommandError::InvalidArgument(trimmed.to_string()));
        }

        let caps = self.command.captures(trimmed)
            .ok_or_else(|| CommandError::UnknownCommand(trimmed.to_string()))?;
        let word = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let argument = caps.get(2).map(|m| m.as_str());

        match word.as_str() {
            "connect" => Ok(Command::Connect),
            "disconnect" => Ok(Command::Disconnect),
            "play" => Ok(Command::Play),
            "select" => {
                let arg = argument.ok_or(CommandError::MissingArgument("select"))?;
                self.parse_square(arg).map(Command::Select)
            }
            "promote" => {
                let arg = argument.ok_or(CommandError::MissingArgument("promote"))?;
                let mut chars = arg.chars();
                match (chars.next().and_then(PieceType::from_letter), chars.next()) {
                    (Some(kind), None) if kind.is_promotion_choice() => Ok(Command::Promote(kind)),
                    _ => Err(CommandError::InvalidArgument(format!("{}. Use q, r, b, or n.", arg))),
                }
            }
            "cancel" => Ok(Command::Cancel),
            "board" => Ok(Command::Board),
            "history" => Ok(Command::History),
            "status" => Ok(Command::Status),
            "export" => Ok(Command::Export(argument.map(str::to_string))),
            "reset" | "rematch" => Ok(Command::Reset),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError::UnknownCommand(word)),
        }
    }

    fn parse_square(&self, s: &str) -> Result<Square, CommandError> {
        if !self.square.is_match(s) {
            return Err(CommandError::InvalidArgument(s.to_string()));
        }
        s.parse().map_err(|e: chess_session::types::ParseSquareError| CommandError::InvalidArgument(e.to_string()))
    }
}

// --- Output ---

fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(io::stderr))
        .init();
}

fn print_board(session: &ConsoleSession) {
    let perspective = session.assigned_color().unwrap_or(Color::White);
    print!("{}", session.board().render(perspective));
    if let Some(king) = session.board().checked_king() {
        println!("Check! King on {}", king);
    }
}

/// Prints everything the session queued since the last call.
fn report_events(session: &mut ConsoleSession) {
    let mut board_changed = false;
    for event in session.drain_events() {
        match event {
            SessionEvent::Connected => println!("Connected."),
            SessionEvent::ConnectionLost { reason } => println!("Disconnected ({}).", reason),
            SessionEvent::Queued => println!("Game requested."),
            SessionEvent::WaitingForOpponent => println!("Waiting for opponent..."),
            SessionEvent::QueueFull => println!("Game queue is full. Try again later."),
            SessionEvent::GameStarted { color } => {
                println!("Game started. You play {}.", color);
                board_changed = true;
            }
            SessionEvent::LocalMoveApplied(mv) | SessionEvent::RemoteMoveApplied(mv) => {
                println!("{} played {}", mv.color, mv.lan);
                board_changed = true;
            }
            SessionEvent::PromotionRequired { from, to } => {
                println!("Promote pawn {} -> {} to? (promote q|r|b|n, or cancel)", from, to);
            }
            SessionEvent::PromotionCancelled => println!("Promotion cancelled."),
            SessionEvent::MoveRejected { intent, reason } => println!("Move {} rejected: {}", intent.lan(), reason),
            SessionEvent::Desynced { lan, reason } => println!("Opponent move {} could not be applied: {}", lan, reason),
            SessionEvent::FrameDiscarded { reason } => println!("Ignored frame: {}", reason),
            SessionEvent::LocalTerminal(outcome) => println!("{}", outcome),
            SessionEvent::GameOver(conclusion) => println!("\n=== {} ===", conclusion),
            SessionEvent::Reset => println!("Ready for a new game."),
        }
    }
    if board_changed {
        print_board(session);
    }
}

fn export(session: &ConsoleSession, filename: &str) -> Result<(), CommandError> {
    let result = session.conclusion().map(|c| c.to_string());
    session.ledger().record(session.board().to_fen(), result).save_to_file(filename)?;
    Ok(())
}

/// Prints available commands.
fn print_help(config: &ClientConfig) {
    println!("\nAvailable Commands:");
    println!("  connect          Connect to {}.", config.server_url);
    println!("  disconnect       Close the connection (forfeits a game in progress).");
    println!("  play             Ask the server for a game.");
    println!("  <square>         Same as 'select <square>' (e.g., e2 then e4).");
    println!("  select <square>  Pick one of your pieces, then one of its destinations.");
    println!("  <move>           Enter a whole move in algebraic notation (e.g., e2e4, a7a8q).");
    println!("  promote <piece>  Answer a promotion prompt with q, r, b or n.");
    println!("  cancel           Dismiss the promotion prompt.");
    println!("  board            Show the board from your side.");
    println!("  history          Show both players' moves.");
    println!("  status           Show the status line.");
    println!("  export [file]    Save the move history as JSON (default: {}).", config.export_path);
    println!("  reset            Return to the lobby after a game ends.");
    println!("  {{...}}            Inject a server frame locally, e.g. {{\"type\":\"game_over\"}}");
    println!("  help             Show this help message.");
    println!("  quit / exit      Exit the client.");
    println!();
}

/// Forwards stdin lines into the main loop's channel until EOF.
fn spawn_stdin_reader(tx: mpsc::Sender<ConsoleInput>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(ConsoleInput::Line(line)).is_err() { return; }
                }
                Err(e) => {
                    eprintln!("Error reading input: {}.", e);
                    break;
                }
            }
        }
        let _ = tx.send(ConsoleInput::Eof);
    });
}

// --- Main Loop ---

fn main() -> Result<(), Box<dyn Error>> {
    let config = ClientConfig::from_env()?;
    init_tracing(&config.log_filter);
    let parser = CommandParser::new()?;

    println!("==============================");
    println!("|   Rust Chess (Networked)   |");
    println!("==============================");
    print_help(&config);

    let (input_tx, input_rx) = mpsc::channel();
    spawn_stdin_reader(input_tx.clone());
    let transport = WsTransport::new(config.server_url.clone(), move |event| {
        let _ = input_tx.send(ConsoleInput::Socket(event));
    })?;
    let mut session = GameSession::new(transport);

    'session_loop: loop {
        report_events(&mut session);

        print!("\n[{}] > ", session.banner());
        io::stdout().flush()?;

        let input_line = match input_rx.recv() {
            Ok(ConsoleInput::Line(line)) => line,
            Ok(ConsoleInput::Socket(SocketEvent::Frame(frame))) => {
                println!();
                session.on_frame(&frame);
                continue 'session_loop;
            }
            Ok(ConsoleInput::Socket(SocketEvent::Closed(reason))) => {
                println!("\nServer connection closed: {}", reason);
                if session.connection_state() == ConnectionState::Connected {
                    session.on_transport_closed();
                }
                continue 'session_loop;
            }
            Ok(ConsoleInput::Eof) | Err(_) => {
                println!("\nEnd of input detected. Quitting.");
                session.disconnect();
                break 'session_loop;
            }
        };
        let input_trimmed = input_line.trim();
        if input_trimmed.is_empty() { continue 'session_loop; }

        let command = match parser.parse(input_trimmed) {
            Ok(command) => command,
            Err(e) => {
                println!("Input Error: {}", e);
                continue 'session_loop;
            }
        };

        match command {
            Command::Connect => {
                if let Err(e) = session.connect() { println!("Error: {}", e); }
            }
            Command::Disconnect => session.disconnect(),
            Command::Play => {
                if let Err(e) = session.request_play() { println!("Error: {}", e); }
            }
            Command::Select(square) => match session.select_square(square) {
                SelectOutcome::Selected { from, quiet, captures } => {
                    let list = |squares: &[Square]| squares.iter().map(Square::to_string).collect::<Vec<_>>().join(" ");
                    println!("{} selected. Moves: [{}] Captures: [{}]", from, list(&quiet), list(&captures));
                }
                SelectOutcome::Cancelled => println!("Selection cleared."),
                SelectOutcome::Ignored if session.match_state() != MatchState::Active => println!("No game in progress."),
                SelectOutcome::Ignored => println!("Nothing to select on {}.", square),
                SelectOutcome::NotSent => println!("Move not sent: connection lost."),
                // Reported through events
                SelectOutcome::PromotionRequired { .. } | SelectOutcome::Applied(_) | SelectOutcome::Rejected(_) => {}
            },
            Command::Move(intent) => match session.submit_move(intent) {
                SelectOutcome::Ignored => println!("Not your move."),
                SelectOutcome::NotSent => println!("Move not sent: connection lost."),
                _ => {}
            },
            Command::Promote(kind) => match session.choose_promotion(kind) {
                Ok(SelectOutcome::NotSent) => println!("Move not sent: connection lost."),
                Ok(_) => {}
                Err(e) => println!("Error: {}", e),
            },
            Command::Cancel => {
                if !session.cancel_promotion() { println!("No promotion to cancel."); }
            }
            Command::Board => print_board(&session),
            Command::History => print!("{}", session.ledger()),
            Command::Status => println!("{}", session.banner()),
            Command::Export(filename) => {
                let filename = filename.unwrap_or_else(|| config.export_path.clone());
                match export(&session, &filename) {
                    Ok(()) => println!("Move history saved to '{}'.", filename),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Command::Reset => {
                if let Err(e) = session.reset() { println!("Error: {}", e); }
            }
            Command::Help => print_help(&config),
            Command::Quit => {
                println!("Exiting.");
                session.disconnect();
                break 'session_loop;
            }
            Command::Frame(frame) => session.on_frame(&frame),
        }
    }

    println!("\nSession finished.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::new().unwrap()
    }

    #[test]
    fn parses_commands_and_squares() {
        let p = parser();
        assert_eq!(p.parse("connect").unwrap(), Command::Connect);
        assert_eq!(p.parse("  PLAY ").unwrap(), Command::Play);
        assert_eq!(p.parse("e2").unwrap(), Command::Select(Square::parse("e2").unwrap()));
        assert_eq!(p.parse("select H8").unwrap(), Command::Select(Square::parse("h8").unwrap()));
        assert_eq!(p.parse("promote q").unwrap(), Command::Promote(PieceType::Queen));
        assert_eq!(p.parse("g1f3").unwrap(), Command::Move(MoveIntent::parse_lan("g1f3").unwrap()));
        assert_eq!(p.parse("A7A8Q").unwrap(), Command::Move(MoveIntent::parse_lan("a7a8q").unwrap()));
        assert_eq!(p.parse("export").unwrap(), Command::Export(None));
        assert_eq!(p.parse("export game.json").unwrap(), Command::Export(Some("game.json".into())));
        assert_eq!(p.parse("?").unwrap(), Command::Help);
    }

    #[test]
    fn frames_pass_through_verbatim() {
        let frame = r#"{"type":"init_game","payload":{"color":"white"}}"#;
        assert_eq!(parser().parse(frame).unwrap(), Command::Frame(frame.to_string()));
    }

    #[test]
    fn rejects_bad_input() {
        let p = parser();
        assert!(matches!(p.parse("select"), Err(CommandError::MissingArgument("select"))));
        assert!(matches!(p.parse("select z9"), Err(CommandError::InvalidArgument(_))));
        assert!(matches!(p.parse("promote k"), Err(CommandError::InvalidArgument(_))));
        assert!(matches!(p.parse("dance"), Err(CommandError::UnknownCommand(_))));
        assert!(matches!(p.parse("select a1 b2"), Err(CommandError::UnknownCommand(_))));
    }
}
