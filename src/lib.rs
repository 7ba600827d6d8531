// src/lib.rs
//! Client side of a two-player networked chess game.
//!
//! A [`GameSession`] keeps a local [`Position`] in step with a remote peer:
//! it gates which moves the local player may originate, sends them over a
//! [`Transport`], applies the opponent's moves as they arrive and projects the
//! move log into a per-color [`Ledger`].

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod session;
pub mod transport;
pub mod types;

pub use codec::{ClientMessage, ServerMessage, WireMove};
pub use config::ClientConfig;
pub use engine::{BoardStatus, DrawReason, Move, MoveIntent, Outcome, Position, ResolvedMove};
pub use error::{CodecError, ConfigError, MoveError, SaveLoadError, SessionError, TransportError};
pub use history::{HistoryEntry, Ledger};
pub use session::{
    Banner, Conclusion, ConnectionState, GameSession, MatchState, QueueStatus, SelectOutcome, Selection, SessionEvent,
};
pub use transport::{MemoryTransport, SocketEvent, Transport, WsTransport};
pub use types::{CastleSide, Color, Piece, PieceType, Square};
