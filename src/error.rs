// src/error.rs
use crate::session::MatchState;
use crate::types::{PieceType, Square};

/// Rejections from the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("invalid position: {0}")]
    InvalidFen(String),
    #[error("no piece found at {0}")]
    PieceNotFound(Square),
    #[error("it's not that piece's turn to move")]
    NotPlayersTurn,
    #[error("illegal move '{0}': leaves king in check")]
    LeavesKingInCheck(String),
    #[error("illegal move pattern or violates game rules: '{0}'")]
    IllegalMovePattern(String), // Covers pins, invalid castle paths, blockages etc.
    #[error("invalid promotion: {0}")]
    InvalidPromotion(String),
    #[error("internal move logic error: {0}")]
    Internal(&'static str),
}

/// Inbound frames that could not be turned into a [`crate::codec::ServerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string 'type' discriminator")]
    MissingType,
    #[error("'{kind}' frame is missing its payload")]
    MissingPayload { kind: String },
    #[error("malformed '{kind}' payload: {source}")]
    MalformedPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown color '{0}'")]
    UnknownColor(String),
    #[error("unknown piece '{0}'")]
    UnknownPiece(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("transport is closed")]
    Closed,
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Requests the session refuses in its current state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not connected to the game server")]
    NotConnected,
    #[error("a game can only be requested from the idle state (currently {0:?})")]
    NotIdle(MatchState),
    #[error("a game can only be reset once it has concluded (currently {0:?})")]
    NotConcluded(MatchState),
    #[error("no promotion is awaiting a piece choice")]
    NoPendingPromotion,
    #[error("cannot promote to {0}")]
    InvalidPromotionPiece(PieceType),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SaveLoadError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("i/o error with file '{0}': {1}")]
    Io(String, #[source] std::io::Error),
}
