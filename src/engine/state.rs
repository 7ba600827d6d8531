// src/engine/state.rs
use tracing::warn;

use crate::engine::tables::*;
use crate::engine::Move;
use crate::error::MoveError;
use crate::types::{Color, Piece, PieceType, Square};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CastlingRights {
    pub(crate) white_kingside: bool, pub(crate) white_queenside: bool,
    pub(crate) black_kingside: bool, pub(crate) black_queenside: bool,
}

impl CastlingRights {
    pub(crate) fn initial() -> Self {
        Self { white_kingside: true, white_queenside: true, black_kingside: true, black_queenside: true }
    }

    pub(crate) fn none() -> Self {
        Self { white_kingside: false, white_queenside: false, black_kingside: false, black_queenside: false }
    }

    fn king_moved(&mut self, color: Color) {
        if color == Color::White {
            self.white_kingside = false;
            self.white_queenside = false;
        } else {
            self.black_kingside = false;
            self.black_queenside = false;
        }
    }

    /// A rook leaving or being captured on its home corner drops that side's right.
    fn rook_square_touched(&mut self, sq: u8) {
        match sq {
            WHITE_QS_ROOK_START => self.white_queenside = false,
            WHITE_KS_ROOK_START => self.white_kingside = false,
            BLACK_QS_ROOK_START => self.black_queenside = false,
            BLACK_KS_ROOK_START => self.black_kingside = false,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BitboardState {
    pub(crate) wp: u64, pub(crate) wn: u64, pub(crate) wb: u64, pub(crate) wr: u64, pub(crate) wq: u64, pub(crate) wk: u64,
    pub(crate) bp: u64, pub(crate) bn: u64, pub(crate) bb: u64, pub(crate) br: u64, pub(crate) bq: u64, pub(crate) bk: u64,
    pub(crate) white_occupied: u64,
    pub(crate) black_occupied: u64,
    pub(crate) occupied: u64,
    pub(crate) turn: Color,
    pub(crate) castling_rights: CastlingRights,
    pub(crate) en_passant_square: Option<u8>,
    pub(crate) halfmove_clock: u32,
    pub(crate) fullmove_number: u32,
}

impl BitboardState {
    pub(crate) fn empty() -> Self {
        BitboardState {
            wp: 0, wn: 0, wb: 0, wr: 0, wq: 0, wk: 0,
            bp: 0, bn: 0, bb: 0, br: 0, bq: 0, bk: 0,
            white_occupied: 0, black_occupied: 0, occupied: 0,
            turn: Color::White,
            castling_rights: CastlingRights::none(),
            en_passant_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub(crate) fn initial() -> Self {
        let mut state = BitboardState::empty();
        state.wp = RANK_2;
        state.wn = (1 << 1) | (1 << 6);
        state.wb = (1 << 2) | (1 << 5);
        state.wr = (1 << WHITE_QS_ROOK_START) | (1 << WHITE_KS_ROOK_START);
        state.wq = 1 << 3;
        state.wk = 1 << WHITE_KING_START;

        state.bp = RANK_7;
        state.bn = state.wn << 56;
        state.bb = state.wb << 56;
        state.br = (1 << BLACK_QS_ROOK_START) | (1 << BLACK_KS_ROOK_START);
        state.bq = state.wq << 56;
        state.bk = 1 << BLACK_KING_START;

        state.castling_rights = CastlingRights::initial();
        state.update_occupancy();
        state
    }

    /// Call after modifying piece bitboards directly.
    #[inline(always)]
    pub(crate) fn update_occupancy(&mut self) {
        self.white_occupied = self.wp | self.wn | self.wb | self.wr | self.wq | self.wk;
        self.black_occupied = self.bp | self.bn | self.bb | self.br | self.bq | self.bk;
        self.occupied = self.white_occupied | self.black_occupied;
    }

    #[inline(always)]
    pub(crate) fn get_piece_board(&self, piece_type: PieceType, color: Color) -> u64 {
        match (color, piece_type) {
            (Color::White, PieceType::Pawn) => self.wp,
            (Color::White, PieceType::Knight) => self.wn,
            (Color::White, PieceType::Bishop) => self.wb,
            (Color::White, PieceType::Rook) => self.wr,
            (Color::White, PieceType::Queen) => self.wq,
            (Color::White, PieceType::King) => self.wk,
            (Color::Black, PieceType::Pawn) => self.bp,
            (Color::Black, PieceType::Knight) => self.bn,
            (Color::Black, PieceType::Bishop) => self.bb,
            (Color::Black, PieceType::Rook) => self.br,
            (Color::Black, PieceType::Queen) => self.bq,
            (Color::Black, PieceType::King) => self.bk,
        }
    }

    #[inline(always)]
    fn get_piece_board_mut(&mut self, piece_type: PieceType, color: Color) -> &mut u64 {
        match (color, piece_type) {
            (Color::White, PieceType::Pawn) => &mut self.wp,
            (Color::White, PieceType::Knight) => &mut self.wn,
            (Color::White, PieceType::Bishop) => &mut self.wb,
            (Color::White, PieceType::Rook) => &mut self.wr,
            (Color::White, PieceType::Queen) => &mut self.wq,
            (Color::White, PieceType::King) => &mut self.wk,
            (Color::Black, PieceType::Pawn) => &mut self.bp,
            (Color::Black, PieceType::Knight) => &mut self.bn,
            (Color::Black, PieceType::Bishop) => &mut self.bb,
            (Color::Black, PieceType::Rook) => &mut self.br,
            (Color::Black, PieceType::Queen) => &mut self.bq,
            (Color::Black, PieceType::King) => &mut self.bk,
        }
    }

    /// Sets a bit on the piece bitboard and XORs the piece into `zobrist_key`.
    /// Occupancy is not refreshed here.
    pub(crate) fn set_piece_at(&mut self, sq: u8, piece: Piece, zobrist_key: &mut u64) {
        let bb = self.get_piece_board_mut(piece.kind, piece.color);
        let mask = 1u64 << sq;
        if *bb & mask == 0 {
            *bb |= mask;
            *zobrist_key ^= ZOBRIST.piece(piece, sq);
        }
    }

    /// Clears a square on every piece bitboard, returning what stood there.
    fn clear_square(&mut self, sq: u8, zobrist_key: &mut u64) -> Option<Piece> {
        let piece = self.get_piece_at(sq)?;
        *self.get_piece_board_mut(piece.kind, piece.color) &= !(1u64 << sq);
        *zobrist_key ^= ZOBRIST.piece(piece, sq);
        Some(piece)
    }

    #[inline(always)]
    pub(crate) fn get_piece_at(&self, sq: u8) -> Option<Piece> {
        let mask = 1u64 << sq;
        let color = if self.white_occupied & mask != 0 {
            Color::White
        } else if self.black_occupied & mask != 0 {
            Color::Black
        } else {
            return None; // Quick exit if square is empty
        };
        PieceType::ALL.iter()
            .find(|&&kind| self.get_piece_board(kind, color) & mask != 0)
            .map(|&kind| Piece::new(kind, color))
    }

    #[inline(always)]
    pub(crate) fn find_king(&self, color: Color) -> Option<u8> {
        let king_board = if color == Color::White { self.wk } else { self.bk };
        if king_board == 0 { None } else { Some(king_board.trailing_zeros() as u8) }
    }

    #[inline(always)]
    pub(crate) fn occupied_by_color(&self, color: Color) -> u64 {
        if color == Color::White { self.white_occupied } else { self.black_occupied }
    }

    /// Full recomputation of the Zobrist key; incremental updates happen in [`Self::apply`].
    pub(crate) fn calculate_zobrist_key(&self) -> u64 {
        let mut key = 0u64;
        let zob = &*ZOBRIST; // Avoid repeated lazy_static deref

        for color in [Color::White, Color::Black] {
            for kind in PieceType::ALL {
                let piece = Piece::new(kind, color);
                let mut board = self.get_piece_board(kind, color);
                while board != 0 {
                    let sq = board.trailing_zeros() as u8;
                    key ^= zob.piece(piece, sq);
                    board &= board - 1; // Clear least significant bit
                }
            }
        }

        key ^= zob.castling(self.castling_rights);
        key ^= zob.en_passant(self.capturable_en_passant());
        key ^= zob.side_to_move(self.turn);
        key
    }

    /// The en passant target, but only when a pawn of the side to move attacks it.
    /// Positions that differ only by an unusable target hash the same.
    pub(crate) fn capturable_en_passant(&self) -> Option<u8> {
        let target = self.en_passant_square?;
        let file = target % 8;
        let (pawns, left, right) = match self.turn {
            Color::White => (self.wp, target.checked_sub(9), target.checked_sub(7)),
            Color::Black => (self.bp, target.checked_add(7), target.checked_add(9)),
        };
        let attackers = [(file > 0).then_some(left).flatten(), (file < 7).then_some(right).flatten()];
        attackers.into_iter()
            .flatten()
            .filter(|sq| *sq < 64)
            .any(|sq| pawns & (1u64 << sq) != 0)
            .then_some(target)
    }

    /// Applies a pseudo-legal move in place, keeping `zobrist_key` in step.
    /// Returns the captured piece, including the pawn taken en passant.
    pub(crate) fn apply(&mut self, mv: &Move, zobrist_key: &mut u64) -> Result<Option<Piece>, MoveError> {
        let moving_color = self.turn;
        let moving_piece = self.get_piece_at(mv.from_sq)
            .ok_or(MoveError::Internal("piece not found at 'from' square"))?;
        if moving_piece.color != moving_color {
            return Err(MoveError::Internal("moving piece does not belong to the side to move"));
        }

        // --- Zobrist: XOR out previous state components ---
        *zobrist_key ^= ZOBRIST.castling(self.castling_rights);
        *zobrist_key ^= ZOBRIST.en_passant(self.capturable_en_passant());
        *zobrist_key ^= ZOBRIST.side_to_move(self.turn);

        let is_pawn_move = moving_piece.kind == PieceType::Pawn;
        let mut captured: Option<Piece> = None;

        // --- Castling: locate the rook before anything moves ---
        let mut castle_rook_move: Option<(u8, u8)> = None;
        if moving_piece.kind == PieceType::King && mv.is_castle {
            let (rook_from, rook_to) = if mv.to_sq > mv.from_sq { // Kingside
                if moving_color == Color::White { (WHITE_KS_ROOK_START, 5) } else { (BLACK_KS_ROOK_START, 61) } // h1->f1, h8->f8
            } else { // Queenside
                if moving_color == Color::White { (WHITE_QS_ROOK_START, 3) } else { (BLACK_QS_ROOK_START, 59) } // a1->d1, a8->d8
            };
            let rook_ok = self.get_piece_at(rook_from)
                .is_some_and(|p| p.kind == PieceType::Rook && p.color == moving_color);
            if !rook_ok {
                return Err(MoveError::Internal("castling rook missing from its origin square"));
            }
            castle_rook_move = Some((rook_from, rook_to));
        }

        // --- En passant: the captured pawn sits behind the target square ---
        if is_pawn_move && Some(mv.to_sq) == self.en_passant_square && self.get_piece_at(mv.to_sq).is_none() {
            let captured_pawn_sq = if moving_color == Color::White {
                mv.to_sq.checked_sub(8)
            } else {
                mv.to_sq.checked_add(8).filter(|sq| *sq < 64)
            }.ok_or(MoveError::Internal("en passant capture square off the board"))?;
            captured = self.clear_square(captured_pawn_sq, zobrist_key);
            if captured.map_or(true, |p| p.kind != PieceType::Pawn || p.color == moving_color) {
                warn!(
                    target_sq = %Square::from_index(mv.to_sq),
                    found = ?captured,
                    "en passant capture did not find an opposing pawn"
                );
            }
        }

        // --- Move the main piece ---
        self.clear_square(mv.from_sq, zobrist_key);
        if let Some(on_target) = self.clear_square(mv.to_sq, zobrist_key) {
            if captured.is_some() {
                return Err(MoveError::Internal("both en passant and direct capture detected"));
            }
            captured = Some(on_target);
        }
        let placed = Piece::new(mv.promotion.unwrap_or(moving_piece.kind), moving_color);
        self.set_piece_at(mv.to_sq, placed, zobrist_key);

        if let Some((rook_from, rook_to)) = castle_rook_move {
            self.clear_square(rook_from, zobrist_key);
            self.set_piece_at(rook_to, Piece::new(PieceType::Rook, moving_color), zobrist_key);
        }

        // --- Castling rights ---
        if moving_piece.kind == PieceType::King {
            self.castling_rights.king_moved(moving_color);
        }
        if moving_piece.kind == PieceType::Rook {
            self.castling_rights.rook_square_touched(mv.from_sq);
        }
        if captured.is_some_and(|p| p.kind == PieceType::Rook) {
            self.castling_rights.rook_square_touched(mv.to_sq);
        }

        // --- En passant target: only after a double push ---
        self.en_passant_square = None;
        if is_pawn_move && (mv.to_sq / 8).abs_diff(mv.from_sq / 8) == 2 {
            let ep_target_sq = if moving_color == Color::White { mv.from_sq + 8 } else { mv.from_sq - 8 };
            self.en_passant_square = Some(ep_target_sq);
        }

        // --- Clocks ---
        if is_pawn_move || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if moving_color == Color::Black {
            self.fullmove_number += 1;
        }

        self.turn = moving_color.opponent();
        self.update_occupancy();

        // --- Zobrist: XOR in the new state components ---
        *zobrist_key ^= ZOBRIST.castling(self.castling_rights);
        *zobrist_key ^= ZOBRIST.en_passant(self.capturable_en_passant());
        *zobrist_key ^= ZOBRIST.side_to_move(self.turn);

        Ok(captured)
    }

    /// Applies a move to a copy, leaving `self` untouched. Used for legality probes.
    pub(crate) fn after(&self, mv: &Move) -> Result<(BitboardState, Option<Piece>), MoveError> {
        let mut next_state = self.clone();
        let mut scratch_key = 0;
        let captured = next_state.apply(mv, &mut scratch_key)?;
        Ok((next_state, captured))
    }
}
