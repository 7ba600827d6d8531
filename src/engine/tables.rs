// src/engine/tables.rs
use lazy_static::lazy_static; // For global precomputed tables and Zobrist table
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::engine::state::CastlingRights;
use crate::types::{Color, Piece};

// --- Bitboard Constants ---
pub(crate) const FILE_A: u64 = 0x0101010101010101;
pub(crate) const FILE_B: u64 = FILE_A << 1;
pub(crate) const FILE_G: u64 = FILE_A << 6;
pub(crate) const FILE_H: u64 = FILE_A << 7;

pub(crate) const RANK_1: u64 = 0x00000000000000FF;
pub(crate) const RANK_2: u64 = RANK_1 << 8;
pub(crate) const RANK_3: u64 = RANK_1 << 16;
pub(crate) const RANK_4: u64 = RANK_1 << 24;
pub(crate) const RANK_5: u64 = RANK_1 << 32;
pub(crate) const RANK_6: u64 = RANK_1 << 40;
pub(crate) const RANK_7: u64 = RANK_1 << 48;
pub(crate) const RANK_8: u64 = RANK_1 << 56;

pub(crate) const NOT_FILE_A: u64 = !FILE_A;
pub(crate) const NOT_FILE_B: u64 = !FILE_B;
pub(crate) const NOT_FILE_G: u64 = !FILE_G;
pub(crate) const NOT_FILE_H: u64 = !FILE_H;

pub(crate) const NOT_RANK_1: u64 = !RANK_1;
pub(crate) const NOT_RANK_2: u64 = !RANK_2;
pub(crate) const NOT_RANK_7: u64 = !RANK_7;
pub(crate) const NOT_RANK_8: u64 = !RANK_8;

pub(crate) const DARK_SQUARES: u64 = 0xAA55AA55AA55AA55;
pub(crate) const LIGHT_SQUARES: u64 = !DARK_SQUARES;

// Square indices for castling
pub(crate) const WHITE_KING_START: u8 = 4; // e1
pub(crate) const WHITE_KS_ROOK_START: u8 = 7; // h1
pub(crate) const WHITE_QS_ROOK_START: u8 = 0; // a1
pub(crate) const WHITE_KING_KS_CASTLE_DEST: u8 = 6; // g1
pub(crate) const WHITE_KING_QS_CASTLE_DEST: u8 = 2; // c1

pub(crate) const BLACK_KING_START: u8 = 60; // e8
pub(crate) const BLACK_KS_ROOK_START: u8 = 63; // h8
pub(crate) const BLACK_QS_ROOK_START: u8 = 56; // a8
pub(crate) const BLACK_KING_KS_CASTLE_DEST: u8 = 62; // g8
pub(crate) const BLACK_KING_QS_CASTLE_DEST: u8 = 58; // c8

// Directions for sliding piece attacks/pins
pub(crate) const DIRECTIONS: &[(i8, i8, bool)] = &[ // (dr, df, is_diagonal)
    ( 1,  0, false), ( -1,  0, false), ( 0,  1, false), ( 0, -1, false), // Orthogonal
    ( 1,  1, true),  ( 1, -1, true),  (-1,  1, true),  (-1, -1, true),  // Diagonal
];

// Fixed seed keeps repetition keys stable between runs.
const ZOBRIST_SEED: u64 = 0xDEADBEEFCAFEBABE;

lazy_static! {
    pub(crate) static ref KNIGHT_ATTACKS: [u64; 64] = compute_knight_attacks();
    pub(crate) static ref KING_ATTACKS: [u64; 64] = compute_king_attacks();
    pub(crate) static ref ZOBRIST: ZobristTable = ZobristTable::new();
}

fn compute_knight_attacks() -> [u64; 64] {
    let mut attacks = [0u64; 64];
    for (sq, slot) in attacks.iter_mut().enumerate() {
        let from_bb = 1u64 << sq;
        let mut moves: u64 = 0;
        // Masks keep the jumps from wrapping around the board edges
        moves |= (from_bb & NOT_FILE_H & NOT_RANK_7 & NOT_RANK_8).wrapping_shl(17); // Up 2 Right 1
        moves |= (from_bb & NOT_FILE_A & NOT_RANK_7 & NOT_RANK_8).wrapping_shl(15); // Up 2 Left 1
        moves |= (from_bb & NOT_FILE_G & NOT_FILE_H & NOT_RANK_8).wrapping_shl(10); // Up 1 Right 2
        moves |= (from_bb & NOT_FILE_A & NOT_FILE_B & NOT_RANK_8).wrapping_shl(6);  // Up 1 Left 2
        moves |= (from_bb & NOT_FILE_A & NOT_RANK_1 & NOT_RANK_2).wrapping_shr(17); // Down 2 Left 1
        moves |= (from_bb & NOT_FILE_H & NOT_RANK_1 & NOT_RANK_2).wrapping_shr(15); // Down 2 Right 1
        moves |= (from_bb & NOT_FILE_A & NOT_FILE_B & NOT_RANK_1).wrapping_shr(10); // Down 1 Left 2
        moves |= (from_bb & NOT_FILE_G & NOT_FILE_H & NOT_RANK_1).wrapping_shr(6);  // Down 1 Right 2
        *slot = moves;
    }
    attacks
}

fn compute_king_attacks() -> [u64; 64] {
    let mut attacks = [0u64; 64];
    for (sq, slot) in attacks.iter_mut().enumerate() {
        let from_bb = 1u64 << sq;
        let mut moves: u64 = 0;
        moves |= (from_bb & NOT_FILE_A & NOT_RANK_8).wrapping_shl(7); // Up-Left
        moves |= (from_bb              & NOT_RANK_8).wrapping_shl(8); // Up
        moves |= (from_bb & NOT_FILE_H & NOT_RANK_8).wrapping_shl(9); // Up-Right
        moves |= (from_bb & NOT_FILE_A             ).wrapping_shr(1); // Left
        moves |= (from_bb & NOT_FILE_H             ).wrapping_shl(1); // Right
        moves |= (from_bb & NOT_FILE_A & NOT_RANK_1).wrapping_shr(9); // Down-Left
        moves |= (from_bb              & NOT_RANK_1).wrapping_shr(8); // Down
        moves |= (from_bb & NOT_FILE_H & NOT_RANK_1).wrapping_shr(7); // Down-Right
        *slot = moves;
    }
    attacks
}

// --- Zobrist Hashing ---
#[derive(Debug, Clone)]
pub(crate) struct ZobristTable {
    // piece[color][piece_type][square]
    piece_keys: [[[u64; 64]; 6]; 2],
    // castling_keys[white_kingside][white_queenside][black_kingside][black_queenside]
    castling_keys: [[[[u64; 2]; 2]; 2]; 2],
    // Only ranks 3 and 6 get keys, every other entry stays 0.
    en_passant_keys: [u64; 64],
    black_to_move_key: u64,
}

impl ZobristTable {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(ZOBRIST_SEED);
        let mut table = ZobristTable {
            piece_keys: [[[0; 64]; 6]; 2],
            castling_keys: [[[[0; 2]; 2]; 2]; 2],
            en_passant_keys: [0; 64],
            black_to_move_key: rng.next_u64(),
        };

        for color in table.piece_keys.iter_mut() {
            for piece_type in color.iter_mut() {
                for key in piece_type.iter_mut() {
                    *key = rng.next_u64();
                }
            }
        }

        for wk in 0..2 {
            for wq in 0..2 {
                for bk in 0..2 {
                    for bq in 0..2 {
                        table.castling_keys[wk][wq][bk][bq] = rng.next_u64();
                    }
                }
            }
        }

        for file in 0..8 {
            table.en_passant_keys[(RANK_3.trailing_zeros() + file) as usize] = rng.next_u64();
            table.en_passant_keys[(RANK_6.trailing_zeros() + file) as usize] = rng.next_u64();
        }

        table
    }

    #[inline(always)]
    pub(crate) fn piece(&self, piece: Piece, sq: u8) -> u64 {
        self.piece_keys[piece.color.index()][piece.kind.index()][sq as usize]
    }

    #[inline(always)]
    pub(crate) fn castling(&self, rights: CastlingRights) -> u64 {
        self.castling_keys[rights.white_kingside as usize][rights.white_queenside as usize]
                          [rights.black_kingside as usize][rights.black_queenside as usize]
    }

    /// Returns 0 when there is no en passant target.
    #[inline(always)]
    pub(crate) fn en_passant(&self, ep_square: Option<u8>) -> u64 {
        match ep_square {
            Some(sq) if sq < 64 => self.en_passant_keys[sq as usize],
            _ => 0,
        }
    }

    /// Returns 0 for White.
    #[inline(always)]
    pub(crate) fn side_to_move(&self, color: Color) -> u64 {
        if color == Color::Black { self.black_to_move_key } else { 0 }
    }
}
