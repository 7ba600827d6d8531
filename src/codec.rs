// src/codec.rs
//! JSON wire protocol spoken with the game server.
//!
//! Every frame is an object with a `type` discriminator and an optional
//! `payload`. Moves travel in the peer rules library's spelling: single
//! lowercase letters for colors and pieces, algebraic squares.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::{MoveIntent, ResolvedMove};
use crate::error::CodecError;
use crate::types::{CastleSide, Color, PieceType, Square};

// --- Message Types ---
pub const INIT_GAME: &str = "init_game";
pub const MOVE: &str = "move";
pub const GAME_OVER: &str = "game_over";
pub const WAITING_FOR_PLAYER: &str = "waiting_for_player";
pub const GAME_QUEUE_FULL: &str = "game_queue_full";

/// A move as it appears on the wire. Only `from`, `to` and `promotion` are
/// required from the peer; the rest is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMove {
    pub color: Option<Color>,
    pub piece: Option<PieceType>,
    pub from: Square,
    pub to: Square,
    pub captured: Option<PieceType>,
    pub promotion: Option<PieceType>,
    pub flags: String,
    pub lan: String,
}

impl WireMove {
    /// Bare intent, e.g. for a peer that only sends squares.
    pub fn from_intent(intent: &MoveIntent) -> Self {
        WireMove {
            color: None,
            piece: None,
            from: intent.from,
            to: intent.to,
            captured: None,
            promotion: intent.promotion,
            flags: String::new(),
            lan: intent.lan(),
        }
    }

    pub fn intent(&self) -> MoveIntent {
        MoveIntent { from: self.from, to: self.to, promotion: self.promotion }
    }

    /// Flag letters: `n` quiet, `b` double pawn push, `c` capture, `e` en passant,
    /// `k`/`q` castling, with `p` appended for promotions.
    fn flags_for(mv: &ResolvedMove) -> String {
        let mut flags = String::with_capacity(2);
        match mv.castle {
            Some(CastleSide::Kingside) => flags.push('k'),
            Some(CastleSide::Queenside) => flags.push('q'),
            None if mv.en_passant => flags.push('e'),
            None if mv.captured.is_some() => flags.push('c'),
            None if mv.piece == PieceType::Pawn && mv.from.rank().abs_diff(mv.to.rank()) == 2 => flags.push('b'),
            None => flags.push('n'),
        }
        if mv.promotion.is_some() { flags.push('p'); }
        flags
    }
}

impl From<&ResolvedMove> for WireMove {
    fn from(mv: &ResolvedMove) -> Self {
        WireMove {
            color: Some(mv.color),
            piece: Some(mv.piece),
            from: mv.from,
            to: mv.to,
            captured: mv.captured,
            promotion: mv.promotion,
            flags: WireMove::flags_for(mv),
            lan: mv.lan.clone(),
        }
    }
}

/// Literal JSON shape of [`WireMove`]. Unknown fields (`san`, `before`, ...) are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct RawMove {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    piece: Option<String>,
    from: Square,
    to: Square,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    captured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    promotion: Option<String>,
    #[serde(default)]
    flags: String,
    #[serde(default)]
    lan: String,
}

fn piece_from_wire(s: &str) -> Result<PieceType, CodecError> {
    let mut chars = s.chars();
    let kind = match (chars.next(), chars.next()) {
        (Some(c), None) => PieceType::from_letter(c),
        // Long spellings ("queen") from lenient peers
        _ => PieceType::ALL.into_iter().find(|kind| kind.name().eq_ignore_ascii_case(s)),
    };
    kind.ok_or_else(|| CodecError::UnknownPiece(s.to_string()))
}

impl TryFrom<RawMove> for WireMove {
    type Error = CodecError;

    fn try_from(raw: RawMove) -> Result<Self, Self::Error> {
        let color = raw.color
            .map(|c| Color::parse(&c).ok_or(CodecError::UnknownColor(c)))
            .transpose()?;
        let lan = if raw.lan.is_empty() {
            let mut lan = format!("{}{}", raw.from, raw.to);
            if let Some(p) = raw.promotion.as_deref() { lan.push_str(p); }
            lan
        } else {
            raw.lan
        };
        Ok(WireMove {
            color,
            piece: raw.piece.as_deref().map(piece_from_wire).transpose()?,
            from: raw.from,
            to: raw.to,
            captured: raw.captured.as_deref().map(piece_from_wire).transpose()?,
            promotion: raw.promotion.as_deref().map(piece_from_wire).transpose()?,
            flags: raw.flags,
            lan,
        })
    }
}

impl From<&WireMove> for RawMove {
    fn from(mv: &WireMove) -> Self {
        RawMove {
            color: mv.color.map(|c| c.letter().to_string()),
            piece: mv.piece.map(|p| p.letter().to_string()),
            from: mv.from,
            to: mv.to,
            captured: mv.captured.map(|p| p.letter().to_string()),
            promotion: mv.promotion.map(|p| p.letter().to_string()),
            flags: mv.flags.clone(),
            lan: mv.lan.clone(),
        }
    }
}

// --- Frames ---

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Join matchmaking.
    InitGame,
    Move(WireMove),
}

/// Frames the server sends, after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    GameInitiated { color: Color },
    MoveApplied(WireMove),
    /// Winner exactly as the server reported it.
    GameOver { winner: Option<String> },
    WaitingForOpponent,
    QueueFull,
    /// Any `type` this client does not know about.
    Unknown(String),
}

impl ServerMessage {
    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::GameInitiated { .. } => INIT_GAME,
            ServerMessage::MoveApplied(_) => MOVE,
            ServerMessage::GameOver { .. } => GAME_OVER,
            ServerMessage::WaitingForOpponent => WAITING_FOR_PLAYER,
            ServerMessage::QueueFull => GAME_QUEUE_FULL,
            ServerMessage::Unknown(kind) => kind,
        }
    }
}

#[derive(Deserialize)]
struct InitPayload {
    color: String,
}

#[derive(Deserialize)]
struct GameOverPayload {
    #[serde(default)]
    winner: Option<String>,
}

pub fn encode(msg: &ClientMessage) -> Result<String, CodecError> {
    let frame = match msg {
        ClientMessage::InitGame => json!({ "type": INIT_GAME }),
        ClientMessage::Move(mv) => json!({
            "type": MOVE,
            "payload": { "move": serde_json::to_value(RawMove::from(mv))? },
        }),
    };
    Ok(frame.to_string())
}

pub fn decode(frame: &str) -> Result<ServerMessage, CodecError> {
    let value: Value = serde_json::from_str(frame)?;
    let kind = value.get("type").and_then(Value::as_str).ok_or(CodecError::MissingType)?;
    let payload = value.get("payload").filter(|p| !p.is_null());

    let malformed = |source: serde_json::Error| CodecError::MalformedPayload { kind: kind.to_string(), source };
    let required = || payload.cloned().ok_or_else(|| CodecError::MissingPayload { kind: kind.to_string() });

    match kind {
        INIT_GAME => {
            let init: InitPayload = serde_json::from_value(required()?).map_err(malformed)?;
            let color = Color::parse(&init.color).ok_or(CodecError::UnknownColor(init.color))?;
            Ok(ServerMessage::GameInitiated { color })
        }
        MOVE => {
            let mut payload = required()?;
            // The move is normally nested under "move"; a bare move object is accepted too.
            if let Some(inner) = payload.get_mut("move") {
                payload = inner.take();
            }
            let raw: RawMove = serde_json::from_value(payload).map_err(malformed)?;
            Ok(ServerMessage::MoveApplied(WireMove::try_from(raw)?))
        }
        GAME_OVER => {
            let winner = match payload {
                Some(p) => serde_json::from_value::<GameOverPayload>(p.clone()).map_err(malformed)?.winner,
                None => None,
            };
            Ok(ServerMessage::GameOver { winner })
        }
        WAITING_FOR_PLAYER => Ok(ServerMessage::WaitingForOpponent),
        GAME_QUEUE_FULL => Ok(ServerMessage::QueueFull),
        other => Ok(ServerMessage::Unknown(other.to_string())),
    }
}
