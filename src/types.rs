// src/types.rs
//! Board vocabulary shared by the engine, the wire codec and the session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- Colors ---
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color { White, Black }

impl Color {
    pub fn opponent(&self) -> Color {
        match self { Color::White => Color::Black, Color::Black => Color::White }
    }

    pub(crate) fn index(&self) -> usize { // Zobrist indexing
        match self { Color::White => 0, Color::Black => 1 }
    }

    /// Single-letter spelling used inside move payloads ("w" / "b").
    pub fn letter(&self) -> char {
        match self { Color::White => 'w', Color::Black => 'b' }
    }

    pub fn from_letter(c: char) -> Option<Color> {
        match c { 'w' => Some(Color::White), 'b' => Some(Color::Black), _ => None }
    }

    /// Long spelling used by the matchmaking messages ("white" / "black").
    pub fn name(&self) -> &'static str {
        match self { Color::White => "white", Color::Black => "black" }
    }

    /// Accepts either spelling, case-insensitive.
    pub fn parse(s: &str) -> Option<Color> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Some(Color::White),
            "black" | "b" => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Color::White => write!(f, "White"), Color::Black => write!(f, "Black") }
    }
}

// --- Pieces ---
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PieceType { Pawn, Knight, Bishop, Rook, Queen, King }

impl PieceType {
    pub(crate) const ALL: [PieceType; 6] = [
        PieceType::Pawn, PieceType::Knight, PieceType::Bishop,
        PieceType::Rook, PieceType::Queen, PieceType::King,
    ];

    /// Kinds a pawn may promote to, in the order the promotion prompt offers them.
    pub const PROMOTION_CHOICES: [PieceType; 4] = [
        PieceType::Queen, PieceType::Rook, PieceType::Bishop, PieceType::Knight,
    ];

    pub(crate) fn index(&self) -> usize { // Zobrist indexing
        match self {
            PieceType::Pawn => 0, PieceType::Knight => 1, PieceType::Bishop => 2,
            PieceType::Rook => 3, PieceType::Queen => 4, PieceType::King => 5,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            PieceType::Pawn => 'p', PieceType::Knight => 'n', PieceType::Bishop => 'b',
            PieceType::Rook => 'r', PieceType::Queen => 'q', PieceType::King => 'k',
        }
    }

    pub fn from_letter(c: char) -> Option<PieceType> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceType::Pawn), 'n' => Some(PieceType::Knight), 'b' => Some(PieceType::Bishop),
            'r' => Some(PieceType::Rook), 'q' => Some(PieceType::Queen), 'k' => Some(PieceType::King),
            _ => None,
        }
    }

    pub fn is_promotion_choice(&self) -> bool {
        PieceType::PROMOTION_CHOICES.contains(self)
    }

    /// Display name used by the move history.
    pub fn name(&self) -> &'static str {
        match self {
            PieceType::Pawn => "Pawn", PieceType::Knight => "Knight", PieceType::Bishop => "Bishop",
            PieceType::Rook => "Rook", PieceType::Queen => "Queen", PieceType::King => "King",
        }
    }
}

impl fmt::Display for PieceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceType,
    pub color: Color,
}

impl Piece {
    pub fn new(kind: PieceType, color: Color) -> Self { Piece { kind, color } }

    /// FEN letter: uppercase for White.
    pub fn from_char(c: char) -> Option<Self> {
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        PieceType::from_letter(c).map(|kind| Piece::new(kind, color))
    }

    pub fn to_char(&self) -> char {
        match self.color {
            Color::White => self.kind.letter().to_ascii_uppercase(),
            Color::Black => self.kind.letter(),
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

// --- Squares ---

/// A board square, index 0 = a1 .. 63 = h8 (rank-major).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    pub fn new(index: u8) -> Option<Square> {
        if index < 64 { Some(Square(index)) } else { None }
    }

    pub fn from_coords(file: u8, rank: u8) -> Option<Square> {
        if file < 8 && rank < 8 { Some(Square(rank * 8 + file)) } else { None }
    }

    /// Caller guarantees `index < 64`.
    pub(crate) const fn from_index(index: u8) -> Square { Square(index) }

    pub fn index(&self) -> u8 { self.0 }
    pub fn file(&self) -> u8 { self.0 % 8 }
    pub fn rank(&self) -> u8 { self.0 / 8 }

    /// Parses algebraic notation ("e4"). File 'a'-'h', rank '1'-'8'.
    pub fn parse(s: &str) -> Option<Square> {
        let mut chars = s.chars();
        let file_char = chars.next()?;
        let rank_char = chars.next()?;
        if chars.next().is_some() { return None; }
        let file = match file_char.to_ascii_lowercase() { c @ 'a'..='h' => c as u8 - b'a', _ => return None };
        let rank = match rank_char { '1'..='8' => rank_char as u8 - b'1', _ => return None };
        Square::from_coords(file, rank)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file()) as char, (b'1' + self.rank()) as char)
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Square({})", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid square '{0}', expected a file a-h followed by a rank 1-8")]
pub struct ParseSquareError(pub String);

impl FromStr for Square {
    type Err = ParseSquareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Square::parse(s).ok_or_else(|| ParseSquareError(s.to_string()))
    }
}

impl Serialize for Square {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CastleSide { Kingside, Queenside }

impl CastleSide {
    pub fn notation(&self) -> &'static str {
        match self { CastleSide::Kingside => "O-O", CastleSide::Queenside => "O-O-O" }
    }
}
