// src/engine/mod.rs
//! Rules engine: a bitboard position with legal move generation, terminal-state
//! detection and the ordered log of every move it has accepted.
//!
//! [`Position`] follows an immutable-snapshot discipline: [`Position::play`]
//! never touches the receiver and hands back the successor position instead.

mod fen;
mod movegen;
mod state;
mod tables;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::MoveError;
use crate::types::{CastleSide, Color, Piece, PieceType, Square};
use state::BitboardState;
use tables::{DARK_SQUARES, LIGHT_SQUARES, WHITE_KING_KS_CASTLE_DEST, BLACK_KING_KS_CASTLE_DEST};

pub use fen::STARTING_FEN;

// --- Move Representation ---

/// A generated move. Flags are set by the generator, never trusted from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub(crate) from_sq: u8,
    pub(crate) to_sq: u8,
    pub(crate) promotion: Option<PieceType>,
    pub(crate) is_capture: bool,
    pub(crate) is_castle: bool,
}

impl Move {
    pub(crate) fn new(from_sq: u8, to_sq: u8, promotion: Option<PieceType>, is_capture: bool) -> Self {
        Move { from_sq, to_sq, promotion, is_capture, is_castle: false }
    }

    /// For moves known to be castling (king generation only).
    pub(crate) fn new_castle(from_sq: u8, to_sq: u8) -> Self {
        Move { from_sq, to_sq, promotion: None, is_capture: false, is_castle: true }
    }

    pub fn from(&self) -> Square { Square::from_index(self.from_sq) }
    pub fn to(&self) -> Square { Square::from_index(self.to_sq) }
    pub fn promotion(&self) -> Option<PieceType> { self.promotion }
    pub fn is_capture(&self) -> bool { self.is_capture }
    pub fn is_castle(&self) -> bool { self.is_castle }

    /// Long algebraic form, e.g. `e2e4` or `a7a8q`.
    pub fn lan(&self) -> String {
        self.intent().lan()
    }

    pub fn intent(&self) -> MoveIntent {
        MoveIntent { from: self.from(), to: self.to(), promotion: self.promotion }
    }
}

/// What a player (or the peer) asks for: origin, destination, promotion piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveIntent {
    pub from: Square,
    pub to: Square,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceType>,
}

impl MoveIntent {
    pub fn new(from: Square, to: Square) -> Self {
        MoveIntent { from, to, promotion: None }
    }

    pub fn with_promotion(mut self, kind: PieceType) -> Self {
        self.promotion = Some(kind);
        self
    }

    pub fn lan(&self) -> String {
        let mut lan = format!("{}{}", self.from, self.to);
        if let Some(p) = self.promotion { lan.push(p.letter()); }
        lan
    }

    /// Parses long algebraic notation: `e2e4`, `a7a8q`.
    pub fn parse_lan(s: &str) -> Option<MoveIntent> {
        if !(4..=5).contains(&s.len()) || !s.is_ascii() { return None; }
        let intent = MoveIntent::new(Square::parse(&s[0..2])?, Square::parse(&s[2..4])?);
        match s[4..].chars().next() {
            Some(c) => PieceType::from_letter(c).map(|kind| intent.with_promotion(kind)),
            None => Some(intent),
        }
    }
}

/// A move as accepted by the engine, with everything the history needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMove {
    pub color: Color,
    pub piece: PieceType,
    pub from: Square,
    pub to: Square,
    pub captured: Option<PieceType>,
    pub promotion: Option<PieceType>,
    pub castle: Option<CastleSide>,
    pub en_passant: bool,
    pub lan: String,
}

impl ResolvedMove {
    pub fn intent(&self) -> MoveIntent {
        MoveIntent { from: self.from, to: self.to, promotion: self.promotion }
    }
}

// --- Terminal States ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardStatus {
    pub turn: Color,
    /// The side to move is in check.
    pub in_check: bool,
    pub checkmate: bool,
    pub draw: Option<DrawReason>,
}

impl BoardStatus {
    pub fn is_terminal(&self) -> bool {
        self.checkmate || self.draw.is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        if self.checkmate {
            Some(Outcome::Checkmate { winner: self.turn.opponent() })
        } else {
            self.draw.map(Outcome::Draw)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Color },
    Draw(DrawReason),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Checkmate { winner } => write!(f, "Checkmate! Winner is {}.", winner),
            Outcome::Draw(reason) => write!(f, "Draw ({:?})", reason),
        }
    }
}

// --- Position ---

#[derive(Debug, Clone)]
pub struct Position {
    state: BitboardState,
    zobrist_key: u64,
    zobrist_history: HashMap<u64, u32>, // Occurrences of each position key
    log: Vec<ResolvedMove>,
}

impl Default for Position {
    fn default() -> Self {
        Position::initial()
    }
}

impl Position {
    pub fn initial() -> Self {
        Position::from_state(BitboardState::initial())
    }

    pub fn from_fen(fen: &str) -> Result<Self, MoveError> {
        BitboardState::from_fen(fen).map(Position::from_state)
    }

    fn from_state(state: BitboardState) -> Self {
        let zobrist_key = state.calculate_zobrist_key();
        let mut zobrist_history = HashMap::new();
        zobrist_history.insert(zobrist_key, 1);
        Position { state, zobrist_key, zobrist_history, log: Vec::new() }
    }

    pub fn to_fen(&self) -> String {
        self.state.to_fen()
    }

    pub fn turn(&self) -> Color {
        self.state.turn
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.state.get_piece_at(sq.index())
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.state.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.state.fullmove_number
    }

    /// Every move accepted since this position was created, oldest first.
    pub fn moves(&self) -> &[ResolvedMove] {
        &self.log
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.state.generate_legal_moves()
    }

    pub fn legal_moves_from(&self, sq: Square) -> Vec<Move> {
        let mut moves = self.state.generate_legal_moves();
        moves.retain(|mv| mv.from_sq == sq.index());
        moves
    }

    pub fn in_check(&self) -> bool {
        self.state.is_in_check(self.state.turn)
    }

    /// Square of the side-to-move king while it stands in check.
    pub fn checked_king(&self) -> Option<Square> {
        if !self.in_check() { return None; }
        self.state.find_king(self.state.turn).map(Square::from_index)
    }

    /// Submits a move. The receiver is left untouched; the successor is returned.
    pub fn play(&self, intent: &MoveIntent) -> Result<(Position, ResolvedMove), MoveError> {
        let legal_moves = self.state.generate_legal_moves();
        let found = legal_moves.iter().find(|legal_mv|
            legal_mv.from_sq == intent.from.index() &&
            legal_mv.to_sq == intent.to.index() &&
            legal_mv.promotion == intent.promotion // Promotion must match!
        );

        let legal_move = match found {
            Some(mv) => *mv,
            None => return Err(self.diagnose(intent, &legal_moves)),
        };

        let mut next = self.clone();
        let resolved = next.apply_legal_move(&legal_move)?;
        Ok((next, resolved))
    }

    /// Explains why `intent` is not in the legal move list.
    fn diagnose(&self, intent: &MoveIntent, legal_moves: &[Move]) -> MoveError {
        let from_piece = match self.piece_at(intent.from) {
            Some(piece) => piece,
            None => return MoveError::PieceNotFound(intent.from),
        };
        if from_piece.color != self.state.turn {
            return MoveError::NotPlayersTurn;
        }

        let same_squares = |mv: &&Move| mv.from_sq == intent.from.index() && mv.to_sq == intent.to.index();
        if legal_moves.iter().any(|mv| same_squares(&mv)) {
            // Squares are fine, the promotion part is not
            return match intent.promotion {
                None => MoveError::InvalidPromotion(format!("{} needs a promotion piece (q, r, b or n)", intent.lan())),
                Some(kind) if !kind.is_promotion_choice() => MoveError::InvalidPromotion(format!("cannot promote to {}", kind)),
                Some(_) => MoveError::InvalidPromotion(format!("{} is not a promotion", MoveIntent::new(intent.from, intent.to).lan())),
            };
        }

        let pseudo = self.state.generate_pseudo_legal_moves();
        match pseudo.iter().find(same_squares) {
            Some(mv) => match self.state.after(mv) {
                Ok((next_state, _)) if next_state.is_in_check(self.state.turn) => MoveError::LeavesKingInCheck(intent.lan()),
                // Pseudo-legal but filtered out, e.g. castling through an attacked square
                Ok(_) => MoveError::IllegalMovePattern(format!("{} (violates rules like castling through check)", intent.lan())),
                Err(e) => e,
            },
            None => MoveError::IllegalMovePattern(format!("{} (invalid piece movement)", intent.lan())),
        }
    }

    /// Applies a generated legal move in place and appends it to the log.
    fn apply_legal_move(&mut self, mv: &Move) -> Result<ResolvedMove, MoveError> {
        let moving_piece = self.state.get_piece_at(mv.from_sq)
            .ok_or(MoveError::Internal("apply_legal_move called with an empty 'from' square"))?;
        let target_was_empty = self.state.get_piece_at(mv.to_sq).is_none();

        let captured = self.state.apply(mv, &mut self.zobrist_key)?;
        let seen = self.zobrist_history.entry(self.zobrist_key).or_insert(0);
        *seen = seen.saturating_add(1);

        let castle = mv.is_castle.then(|| {
            if mv.to_sq == WHITE_KING_KS_CASTLE_DEST || mv.to_sq == BLACK_KING_KS_CASTLE_DEST {
                CastleSide::Kingside
            } else {
                CastleSide::Queenside
            }
        });

        let resolved = ResolvedMove {
            color: moving_piece.color,
            piece: moving_piece.kind,
            from: mv.from(),
            to: mv.to(),
            captured: captured.map(|p| p.kind),
            promotion: mv.promotion,
            castle,
            en_passant: moving_piece.kind == PieceType::Pawn && captured.is_some() && target_was_empty,
            lan: mv.lan(),
        };
        self.log.push(resolved.clone());
        Ok(resolved)
    }

    // --- Terminal State Detection ---

    pub fn status(&self) -> BoardStatus {
        let turn = self.state.turn;
        let in_check = self.state.is_in_check(turn);
        let has_moves = !self.state.generate_legal_moves().is_empty();

        let draw = if !has_moves && !in_check {
            Some(DrawReason::Stalemate)
        } else if !has_moves {
            None
        } else if self.state.halfmove_clock >= 100 {
            Some(DrawReason::FiftyMoveRule)
        } else if self.is_insufficient_material() {
            Some(DrawReason::InsufficientMaterial)
        } else if self.repetition_count() >= 3 {
            Some(DrawReason::ThreefoldRepetition)
        } else {
            None
        };

        BoardStatus { turn, in_check, checkmate: in_check && !has_moves, draw }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.status().outcome()
    }

    /// How many times the current position has occurred.
    pub fn repetition_count(&self) -> u32 {
        self.zobrist_history.get(&self.zobrist_key).copied().unwrap_or(0)
    }

    /// Positions where checkmate is impossible by any sequence of legal moves.
    fn is_insufficient_material(&self) -> bool {
        let state = &self.state;

        // Pawns, rooks or queens can always mate.
        if state.wp != 0 || state.bp != 0 || state.wr != 0 || state.br != 0 || state.wq != 0 || state.bq != 0 { return false; }

        let knights = state.wn.count_ones() + state.bn.count_ones();
        let bishops = state.wb | state.bb;
        let minors = knights + bishops.count_ones();

        // K vs K, or K + one minor piece vs K
        if minors <= 1 { return true; }

        // Only bishops left, all on the same square color
        knights == 0 && ((bishops & LIGHT_SQUARES == 0) || (bishops & DARK_SQUARES == 0))
    }

    /// ASCII board from `perspective`'s side of the table.
    pub fn render(&self, perspective: Color) -> String {
        let mut out = String::new();
        let ranks: Vec<u8> = match perspective {
            Color::White => (0..8).rev().collect(),
            Color::Black => (0..8).collect(),
        };
        let files: Vec<u8> = match perspective {
            Color::White => (0..8).collect(),
            Color::Black => (0..8).rev().collect(),
        };

        out.push_str("  +-----------------+\n");
        for &rank in &ranks {
            out.push_str(&format!("{} | ", rank + 1));
            for &file in &files {
                match self.state.get_piece_at(rank * 8 + file) {
                    Some(piece) => out.push_str(&format!("{} ", piece)),
                    None => out.push_str(". "),
                }
            }
            out.push_str("|\n");
        }
        out.push_str("  +-----------------+\n    ");
        for &file in &files {
            out.push((b'a' + file) as char);
            out.push(' ');
        }
        out.push('\n');
        out
    }
}

impl PartialEq for Position {
    /// Same placement, side, rights and clocks, and the same move log.
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.log == other.log
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Color::White))?;
        writeln!(f, "Turn: {}", self.state.turn)?;
        if let Some(ep_sq) = self.state.en_passant_square {
            writeln!(f, "En Passant Target: {}", Square::from_index(ep_sq))?;
        }
        writeln!(f, "Halfmove Clock: {}", self.state.halfmove_clock)?;
        write!(f, "Fullmove Number: {}", self.state.fullmove_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    fn intent(lan: &str) -> MoveIntent {
        MoveIntent::parse_lan(lan).unwrap()
    }

    fn play_all(mut pos: Position, lans: &[&str]) -> Position {
        for lan in lans {
            pos = pos.play(&intent(lan)).unwrap_or_else(|e| panic!("{lan}: {e}")).0;
        }
        pos
    }

    #[test]
    fn play_returns_a_new_snapshot() {
        let start = Position::initial();
        let (next, resolved) = start.play(&intent("e2e4")).unwrap();
        assert_eq!(start, Position::initial());
        assert_eq!(next.turn(), Color::Black);
        assert_eq!(resolved.piece, PieceType::Pawn);
        assert_eq!(resolved.lan, "e2e4");
        assert_eq!(next.moves().len(), 1);
        assert!(start.moves().is_empty());
    }

    #[test]
    fn legal_moves_from_a_single_square() {
        let pos = Position::initial();
        let mut targets: Vec<String> = pos.legal_moves_from(sq("g1")).iter().map(|m| m.to().to_string()).collect();
        targets.sort();
        assert_eq!(targets, vec!["f3", "h3"]);
        assert!(pos.legal_moves_from(sq("e1")).is_empty());
        assert!(pos.legal_moves_from(sq("e4")).is_empty());
    }

    #[test]
    fn diagnoses_rejections() {
        let pos = Position::initial();
        assert_eq!(pos.play(&intent("e4e5")).unwrap_err(), MoveError::PieceNotFound(sq("e4")));
        assert_eq!(pos.play(&intent("e7e5")).unwrap_err(), MoveError::NotPlayersTurn);
        assert!(matches!(pos.play(&intent("e2e5")).unwrap_err(), MoveError::IllegalMovePattern(_)));

        // Bishop on e2 is pinned by the rook on e8
        let pinned = Position::from_fen("4r1k1/8/8/8/8/8/4B3/4K3 w - - 0 1").unwrap();
        assert_eq!(pinned.play(&intent("e2d3")).unwrap_err(), MoveError::LeavesKingInCheck("e2d3".into()));
    }

    #[test]
    fn promotion_requires_a_piece() {
        let pos = Position::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        assert!(matches!(pos.play(&intent("a7a8")).unwrap_err(), MoveError::InvalidPromotion(_)));
        assert!(matches!(pos.play(&intent("a7a8k")).unwrap_err(), MoveError::InvalidPromotion(_)));
        let (next, resolved) = pos.play(&intent("a7a8n")).unwrap();
        assert_eq!(resolved.promotion, Some(PieceType::Knight));
        assert_eq!(next.piece_at(sq("a8")), Some(Piece::new(PieceType::Knight, Color::White)));
    }

    #[test]
    fn castling_is_resolved_with_its_side() {
        let pos = play_all(Position::initial(), &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "f8c5", "e1g1"]);
        let last = pos.moves().last().unwrap();
        assert_eq!(last.castle, Some(CastleSide::Kingside));
        assert_eq!(pos.piece_at(sq("f1")), Some(Piece::new(PieceType::Rook, Color::White)));
        assert_eq!(pos.piece_at(sq("g1")), Some(Piece::new(PieceType::King, Color::White)));
    }

    #[test]
    fn cannot_castle_through_check_but_may_when_only_b_file_is_attacked() {
        // Black rook on f8 covers f1: kingside castling is out, queenside stays
        let pos = Position::from_fen("r3kr2/8/8/8/8/8/8/R3K2R w KQq - 0 1").unwrap();
        assert!(pos.play(&intent("e1g1")).is_err());
        assert!(pos.play(&intent("e1c1")).is_ok());
        // Rook on b8 only attacks b1, which the king never crosses
        let pos = Position::from_fen("1r2k3/8/8/8/8/8/8/R3K3 w Q - 0 1").unwrap();
        let (_, resolved) = pos.play(&intent("e1c1")).unwrap();
        assert_eq!(resolved.castle, Some(CastleSide::Queenside));
    }

    #[test]
    fn king_cannot_retreat_along_a_checking_ray() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/r3K3 w - - 0 1").unwrap();
        assert!(pos.in_check());
        assert!(pos.play(&intent("e1f1")).is_err());
        assert!(pos.play(&intent("e1e2")).is_ok());
    }

    #[test]
    fn en_passant_is_recorded() {
        let pos = play_all(Position::initial(), &["e2e4", "a7a6", "e4e5", "d7d5", "e5d6"]);
        let last = pos.moves().last().unwrap();
        assert!(last.en_passant);
        assert_eq!(last.captured, Some(PieceType::Pawn));
        assert_eq!(pos.piece_at(sq("d5")), None);
    }

    #[test]
    fn fools_mate_is_checkmate() {
        let pos = play_all(Position::initial(), &["f2f3", "e7e5", "g2g4", "d8h4"]);
        let status = pos.status();
        assert!(status.in_check);
        assert!(status.checkmate);
        assert_eq!(pos.outcome(), Some(Outcome::Checkmate { winner: Color::Black }));
        assert_eq!(pos.checked_king(), Some(sq("e1")));
        assert_eq!(pos.outcome().unwrap().to_string(), "Checkmate! Winner is Black.");
    }

    #[test]
    fn draw_detection() {
        let stalemate = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(stalemate.status().draw, Some(DrawReason::Stalemate));
        assert!(!stalemate.status().checkmate);

        let bare_kings = Position::from_fen("8/8/4k3/8/8/3K4/8/8 w - - 0 1").unwrap();
        assert_eq!(bare_kings.status().draw, Some(DrawReason::InsufficientMaterial));

        let fifty = Position::from_fen("8/8/4k3/8/8/3K4/8/R7 w - - 100 80").unwrap();
        assert_eq!(fifty.status().draw, Some(DrawReason::FiftyMoveRule));

        let shuffled = play_all(Position::initial(), &["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"]);
        assert_eq!(shuffled.repetition_count(), 3);
        assert_eq!(shuffled.status().draw, Some(DrawReason::ThreefoldRepetition));

        assert_eq!(Position::initial().status().draw, None);
    }

    #[test]
    fn threefold_ignores_an_uncapturable_en_passant_target() {
        let pos = play_all(Position::initial(), &[
            "e2e4", "e7e5", "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ]);
        assert_eq!(pos.repetition_count(), 3);
        assert_eq!(pos.status().draw, Some(DrawReason::ThreefoldRepetition));
    }

    #[test]
    fn capturable_en_passant_target_makes_a_distinct_position() {
        // After d7d5 the e5 pawn may take en passant; once the knights return it may not
        let pos = play_all(Position::initial(), &[
            "e2e4", "g8f6", "e4e5", "d7d5", "g1f3", "f6g8", "f3g1", "g8f6", "g1f3", "f6g8", "f3g1", "g8f6",
        ]);
        assert_eq!(pos.repetition_count(), 2);
        assert_eq!(pos.status().draw, None);
    }

    #[test]
    fn parses_long_algebraic() {
        assert_eq!(MoveIntent::parse_lan("e2e4"), Some(MoveIntent::new(sq("e2"), sq("e4"))));
        assert_eq!(MoveIntent::parse_lan("a7a8q").and_then(|m| m.promotion), Some(PieceType::Queen));
        for bad in ["e2", "e2e9", "e2e4x", "e2e4qq", "é2e4"] {
            assert_eq!(MoveIntent::parse_lan(bad), None, "{bad}");
        }
    }

    #[test]
    fn render_flips_for_black() {
        let pos = Position::initial();
        let white_view = pos.render(Color::White);
        let black_view = pos.render(Color::Black);
        assert!(white_view.lines().nth(1).unwrap().starts_with("8 | r n b q k b n r"));
        assert!(black_view.lines().nth(1).unwrap().starts_with("1 | R N B K Q B N R"));
        assert!(black_view.trim_end().ends_with("h g f e d c b a"));
    }
}
