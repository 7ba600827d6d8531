// src/engine/movegen.rs
use tracing::error;

use crate::engine::state::BitboardState;
use crate::engine::tables::*;
use crate::engine::Move;
use crate::types::{Color, PieceType};

/// Absolutely pinned pieces of one side.
#[derive(Debug, Clone)]
struct PinInfo {
    pinned_pieces: u64,
    /// Per square: the ray a pinned piece may still travel, pinner included. 0 if not pinned.
    pin_restriction_map: [u64; 64],
}

impl Default for PinInfo {
    fn default() -> Self {
        PinInfo { pinned_pieces: 0, pin_restriction_map: [0u64; 64] }
    }
}

impl BitboardState {
    // --- Pseudo-Legal Generation ---
    /// All moves obeying piece movement rules for the side to move.
    /// Checks, pins and castling through attacked squares are filtered later.
    pub(crate) fn generate_pseudo_legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::with_capacity(48);
        let color = self.turn;
        let opp_occupied = self.occupied_by_color(color.opponent());
        let own_occupied = self.occupied_by_color(color);

        for piece_type in PieceType::ALL {
            let mut board = self.get_piece_board(piece_type, color);
            while board != 0 {
                let from_sq = board.trailing_zeros() as u8;
                match piece_type {
                    PieceType::Pawn => self.generate_pawn_moves(from_sq, color, opp_occupied, &mut moves),
                    PieceType::Knight => Self::push_targets(from_sq, KNIGHT_ATTACKS[from_sq as usize] & !own_occupied, opp_occupied, &mut moves),
                    PieceType::Bishop => Self::push_targets(from_sq, self.sliding_attacks(from_sq, self.occupied, true, false) & !own_occupied, opp_occupied, &mut moves),
                    PieceType::Rook => Self::push_targets(from_sq, self.sliding_attacks(from_sq, self.occupied, false, true) & !own_occupied, opp_occupied, &mut moves),
                    PieceType::Queen => Self::push_targets(from_sq, self.sliding_attacks(from_sq, self.occupied, true, true) & !own_occupied, opp_occupied, &mut moves),
                    PieceType::King => self.generate_king_moves(from_sq, color, own_occupied, opp_occupied, &mut moves),
                }
                board &= board - 1; // Clear the least significant bit
            }
        }
        moves
    }

    /// One move per set bit in `targets`.
    #[inline]
    fn push_targets(from_sq: u8, targets: u64, opp_occupied: u64, moves: &mut Vec<Move>) {
        let mut results = targets;
        while results != 0 {
            let to_sq = results.trailing_zeros() as u8;
            let is_capture = ((1u64 << to_sq) & opp_occupied) != 0;
            moves.push(Move::new(from_sq, to_sq, None, is_capture));
            results &= results - 1;
        }
    }

    /// Pushes, double pushes, captures, en passant and promotions.
    fn generate_pawn_moves(&self, from_sq: u8, color: Color, opp_occupied: u64, moves: &mut Vec<Move>) {
        let from_bb = 1u64 << from_sq;
        let empty_squares = !self.occupied;

        let (push_one_offset, push_two_offset, capture_left_offset, capture_right_offset, promotion_rank_mask, start_rank_mask, ep_capture_rank_mask) =
            if color == Color::White {
                (8i8, 16i8, 7i8, 9i8, RANK_8, RANK_2, RANK_5) // White EP capture happens *from* rank 5
            } else {
                (-8i8, -16i8, -9i8, -7i8, RANK_1, RANK_7, RANK_4) // Black EP capture happens *from* rank 4
            };

        // 1. Single push, then double push from the start rank
        let target_one = from_sq as i8 + push_one_offset;
        if (0..64).contains(&target_one) {
            let target_one = target_one as u8;
            let target_bb_one = 1u64 << target_one;
            if target_bb_one & empty_squares != 0 {
                if target_bb_one & promotion_rank_mask != 0 {
                    Self::add_promotions(from_sq, target_one, false, moves);
                } else {
                    moves.push(Move::new(from_sq, target_one, None, false));
                }
                if from_bb & start_rank_mask != 0 {
                    let target_two = (from_sq as i8 + push_two_offset) as u8; // start rank keeps this on the board
                    if (1u64 << target_two) & empty_squares != 0 {
                        moves.push(Move::new(from_sq, target_two, None, false));
                    }
                }
            }
        }

        // 2. Captures, regular and en passant
        for capture_offset in [capture_left_offset, capture_right_offset] {
            if (capture_offset == 7 || capture_offset == -9) && (from_bb & FILE_A != 0) { continue; } // Capture left from A file
            if (capture_offset == 9 || capture_offset == -7) && (from_bb & FILE_H != 0) { continue; } // Capture right from H file

            let target_cap = from_sq as i8 + capture_offset;
            if !(0..64).contains(&target_cap) { continue; }
            let target_cap = target_cap as u8;
            let target_bb_cap = 1u64 << target_cap;
            if target_bb_cap & opp_occupied != 0 {
                if target_bb_cap & promotion_rank_mask != 0 {
                    Self::add_promotions(from_sq, target_cap, true, moves);
                } else {
                    moves.push(Move::new(from_sq, target_cap, None, true));
                }
            } else if (from_bb & ep_capture_rank_mask != 0) && Some(target_cap) == self.en_passant_square {
                // Target square is empty but it's still a capture
                moves.push(Move::new(from_sq, target_cap, None, true));
            }
        }
    }

    /// Queen first, then the underpromotions.
    #[inline]
    fn add_promotions(from_sq: u8, to_sq: u8, is_capture: bool, moves: &mut Vec<Move>) {
        for kind in PieceType::PROMOTION_CHOICES {
            moves.push(Move::new(from_sq, to_sq, Some(kind), is_capture));
        }
    }

    /// Single steps plus castling when rights hold and the squares between are empty.
    fn generate_king_moves(&self, from_sq: u8, color: Color, own_occupied: u64, opp_occupied: u64, moves: &mut Vec<Move>) {
        Self::push_targets(from_sq, KING_ATTACKS[from_sq as usize] & !own_occupied, opp_occupied, moves);

        let (can_kside, can_qside, kside_empty_mask, qside_empty_mask, kside_rook_sq, qside_rook_sq, king_start, kside_target_sq, qside_target_sq) =
            if color == Color::White {
                (self.castling_rights.white_kingside, self.castling_rights.white_queenside,
                 (1u64 << 5) | (1 << 6),            // f1, g1
                 (1u64 << 1) | (1 << 2) | (1 << 3), // b1, c1, d1
                 WHITE_KS_ROOK_START, WHITE_QS_ROOK_START, WHITE_KING_START,
                 WHITE_KING_KS_CASTLE_DEST, WHITE_KING_QS_CASTLE_DEST)
            } else {
                (self.castling_rights.black_kingside, self.castling_rights.black_queenside,
                 ((1u64 << 5) | (1 << 6)) << 56,            // f8, g8
                 ((1u64 << 1) | (1 << 2) | (1 << 3)) << 56, // b8, c8, d8
                 BLACK_KS_ROOK_START, BLACK_QS_ROOK_START, BLACK_KING_START,
                 BLACK_KING_KS_CASTLE_DEST, BLACK_KING_QS_CASTLE_DEST)
            };
        if from_sq != king_start { return; }

        let rook_board = self.get_piece_board(PieceType::Rook, color);
        if can_kside && (rook_board & (1 << kside_rook_sq) != 0) && (self.occupied & kside_empty_mask == 0) {
            moves.push(Move::new_castle(from_sq, kside_target_sq));
        }
        if can_qside && (rook_board & (1 << qside_rook_sq) != 0) && (self.occupied & qside_empty_mask == 0) {
            moves.push(Move::new_castle(from_sq, qside_target_sq));
        }
    }

    // --- Attack Generation ---
    /// Raw attack test, ignoring pins and legality.
    pub(crate) fn is_square_attacked(&self, target_sq: u8, attacker_color: Color) -> bool {
        let target_bb = 1u64 << target_sq;

        let pawn_board = self.get_piece_board(PieceType::Pawn, attacker_color);
        if pawn_board != 0 {
            let (cap_l_off, cap_r_off) = if attacker_color == Color::White {
                (-9i8, -7i8) // White pawns attack from SW and SE of the target
            } else {
                (7i8, 9i8)   // Black pawns attack from NW and NE of the target
            };
            if target_bb & NOT_FILE_A != 0 {
                let att_sq = target_sq as i8 + cap_l_off;
                if (0..64).contains(&att_sq) && (pawn_board & (1u64 << att_sq)) != 0 { return true; }
            }
            if target_bb & NOT_FILE_H != 0 {
                let att_sq = target_sq as i8 + cap_r_off;
                if (0..64).contains(&att_sq) && (pawn_board & (1u64 << att_sq)) != 0 { return true; }
            }
        }

        if KNIGHT_ATTACKS[target_sq as usize] & self.get_piece_board(PieceType::Knight, attacker_color) != 0 { return true; }
        if KING_ATTACKS[target_sq as usize] & self.get_piece_board(PieceType::King, attacker_color) != 0 { return true; }

        let queen_board = self.get_piece_board(PieceType::Queen, attacker_color);
        let orth_attackers = self.get_piece_board(PieceType::Rook, attacker_color) | queen_board;
        if orth_attackers != 0 && self.sliding_attacks(target_sq, self.occupied, false, true) & orth_attackers != 0 {
            return true;
        }
        let diag_attackers = self.get_piece_board(PieceType::Bishop, attacker_color) | queen_board;
        if diag_attackers != 0 && self.sliding_attacks(target_sq, self.occupied, true, false) & diag_attackers != 0 {
            return true;
        }
        false
    }

    #[inline]
    pub(crate) fn is_in_check(&self, color: Color) -> bool {
        match self.find_king(color) {
            Some(king_sq) => self.is_square_attacked(king_sq, color.opponent()),
            None => {
                // A missing king means the position is corrupt; treat it as check
                error!(?color, "king not found in bitboard state");
                true
            }
        }
    }

    // --- Pin Detection ---
    fn compute_pins(&self, color: Color) -> PinInfo {
        let king_sq = match self.find_king(color) {
            Some(sq) => sq,
            None => return PinInfo::default(),
        };

        let mut pin_info = PinInfo::default();
        let own_occupied = self.occupied_by_color(color);
        let opp_color = color.opponent();
        let opp_rooks_queens = self.get_piece_board(PieceType::Rook, opp_color) | self.get_piece_board(PieceType::Queen, opp_color);
        let opp_bishops_queens = self.get_piece_board(PieceType::Bishop, opp_color) | self.get_piece_board(PieceType::Queen, opp_color);

        for &(dr, df, is_diagonal) in DIRECTIONS {
            let potential_pinners = if is_diagonal { opp_bishops_queens } else { opp_rooks_queens };
            if potential_pinners == 0 { continue; }

            let mut ray_mask: u64 = 0; // Squares from the king out to the pinner, inclusive
            let mut potential_pinned_sq: Option<u8> = None;
            let mut current_rank = (king_sq / 8) as i8;
            let mut current_file = (king_sq % 8) as i8;

            loop {
                current_rank += dr;
                current_file += df;
                if !(0..8).contains(&current_rank) || !(0..8).contains(&current_file) { break; }
                let next_sq = (current_rank * 8 + current_file) as u8;
                let next_bb = 1u64 << next_sq;
                ray_mask |= next_bb;

                if next_bb & self.occupied == 0 { continue; }
                if next_bb & own_occupied != 0 {
                    if potential_pinned_sq.is_some() { break; } // Two friendly pieces, no pin
                    potential_pinned_sq = Some(next_sq);
                } else {
                    if let Some(pinned_sq) = potential_pinned_sq {
                        if next_bb & potential_pinners != 0 {
                            pin_info.pinned_pieces |= 1u64 << pinned_sq;
                            pin_info.pin_restriction_map[pinned_sq as usize] = ray_mask;
                        }
                    }
                    break;
                }
            }
        }
        pin_info
    }

    // --- Legal Move Generation ---
    pub(crate) fn generate_legal_moves(&self) -> Vec<Move> {
        let mut legal_moves = Vec::with_capacity(48);
        let color = self.turn;

        let king_sq = match self.find_king(color) {
            Some(sq) => sq,
            None => return legal_moves,
        };

        let pin_info = self.compute_pins(color);
        // The king must not shelter behind itself from a slider, so it is lifted off the board.
        let occupied_without_king = self.occupied & !(1u64 << king_sq);
        let attacked_by_opponent = self.compute_attack_map(color.opponent(), occupied_without_king);
        let is_king_in_check = (attacked_by_opponent & (1u64 << king_sq)) != 0;

        for mv in self.generate_pseudo_legal_moves() {
            let from_bb = 1u64 << mv.from_sq;

            if mv.from_sq == king_sq {
                if (attacked_by_opponent & (1u64 << mv.to_sq)) != 0 { continue; }
                if mv.is_castle {
                    if is_king_in_check { continue; }
                    // The square the king crosses (f-file or d-file) must be safe too
                    let pass_sq = if mv.to_sq > mv.from_sq { mv.from_sq + 1 } else { mv.from_sq - 1 };
                    if (attacked_by_opponent & (1u64 << pass_sq)) != 0 { continue; }
                }
                legal_moves.push(mv);
                continue;
            }

            let is_pinned = (from_bb & pin_info.pinned_pieces) != 0;
            if is_pinned && ((1u64 << mv.to_sq) & pin_info.pin_restriction_map[mv.from_sq as usize]) == 0 {
                continue;
            }

            let is_ep_capture = self.en_passant_square == Some(mv.to_sq)
                && mv.is_capture
                && self.get_piece_board(PieceType::Pawn, color) & from_bb != 0
                && self.get_piece_at(mv.to_sq).is_none();

            // Unpinned moves out of check-free positions are safe as generated;
            // everything else is simulated (blocks, pinned slides, en passant discoveries).
            if !is_ep_capture && !is_king_in_check && !is_pinned {
                legal_moves.push(mv);
                continue;
            }
            match self.after(&mv) {
                Ok((next_state, _)) => {
                    if !next_state.is_in_check(color) {
                        legal_moves.push(mv);
                    }
                }
                Err(e) => error!(mv = %mv.lan(), %e, "legality probe failed"),
            }
        }
        legal_moves
    }

    /// Every square attacked by `attacker_color`, sliders blocked by `occupied`.
    fn compute_attack_map(&self, attacker_color: Color, occupied: u64) -> u64 {
        let mut attack_map: u64 = 0;

        let pawn_board = self.get_piece_board(PieceType::Pawn, attacker_color);
        if attacker_color == Color::White {
            attack_map |= (pawn_board & NOT_FILE_A).wrapping_shl(7);
            attack_map |= (pawn_board & NOT_FILE_H).wrapping_shl(9);
        } else {
            attack_map |= (pawn_board & NOT_FILE_A).wrapping_shr(9);
            attack_map |= (pawn_board & NOT_FILE_H).wrapping_shr(7);
        }

        let mut knights = self.get_piece_board(PieceType::Knight, attacker_color);
        while knights != 0 {
            attack_map |= KNIGHT_ATTACKS[knights.trailing_zeros() as usize];
            knights &= knights - 1;
        }

        let king_board = self.get_piece_board(PieceType::King, attacker_color);
        if king_board != 0 {
            attack_map |= KING_ATTACKS[king_board.trailing_zeros() as usize];
        }

        let queen_board = self.get_piece_board(PieceType::Queen, attacker_color);
        let mut rooks_queens = self.get_piece_board(PieceType::Rook, attacker_color) | queen_board;
        while rooks_queens != 0 {
            attack_map |= self.sliding_attacks(rooks_queens.trailing_zeros() as u8, occupied, false, true);
            rooks_queens &= rooks_queens - 1;
        }
        let mut bishops_queens = self.get_piece_board(PieceType::Bishop, attacker_color) | queen_board;
        while bishops_queens != 0 {
            attack_map |= self.sliding_attacks(bishops_queens.trailing_zeros() as u8, occupied, true, false);
            bishops_queens &= bishops_queens - 1;
        }

        attack_map
    }

    /// Ray attacks from a square, stopping at (and including) the first blocker.
    #[inline]
    fn sliding_attacks(&self, from_sq: u8, occupied: u64, diagonals: bool, orthogonals: bool) -> u64 {
        let mut attacks: u64 = 0;
        for &(dr, df, is_diagonal) in DIRECTIONS {
            if !((diagonals && is_diagonal) || (orthogonals && !is_diagonal)) { continue; }
            let mut current_rank = (from_sq / 8) as i8;
            let mut current_file = (from_sq % 8) as i8;
            loop {
                current_rank += dr;
                current_file += df;
                if !(0..8).contains(&current_rank) || !(0..8).contains(&current_file) { break; }
                let next_bb = 1u64 << (current_rank * 8 + current_file);
                attacks |= next_bb;
                if next_bb & occupied != 0 { break; }
            }
        }
        attacks
    }
}
