// src/engine/fen.rs
//! Forsyth-Edwards Notation for [`BitboardState`].

use crate::engine::state::{BitboardState, CastlingRights};
use crate::error::MoveError;
use crate::types::{Color, Piece, Square};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl BitboardState {
    /// Halfmove and fullmove counters may be omitted; they default to `0 1`.
    pub(crate) fn from_fen(fen: &str) -> Result<BitboardState, MoveError> {
        let invalid = |reason: &str| MoveError::InvalidFen(format!("{reason} in '{fen}'"));
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if !(4..=6).contains(&fields.len()) {
            return Err(invalid("expected 4 to 6 fields"));
        }

        let mut state = BitboardState::empty();
        let mut scratch_key = 0;

        // --- Placement, rank 8 first ---
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(invalid("expected 8 ranks"));
        }
        for (row, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - row as u8;
            let mut file: u8 = 0;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if !(1..=8).contains(&skip) { return Err(invalid("bad empty-square count")); }
                    file += skip as u8;
                } else {
                    let piece = Piece::from_char(c).ok_or_else(|| invalid("unknown piece letter"))?;
                    let sq = Square::from_coords(file, rank).ok_or_else(|| invalid("rank overflows 8 files"))?;
                    state.set_piece_at(sq.index(), piece, &mut scratch_key);
                    file += 1;
                }
                if file > 8 { return Err(invalid("rank overflows 8 files")); }
            }
            if file != 8 { return Err(invalid("rank does not cover 8 files")); }
        }
        state.update_occupancy();
        if state.wk.count_ones() != 1 || state.bk.count_ones() != 1 {
            return Err(invalid("each side needs exactly one king"));
        }

        // --- Side to move ---
        state.turn = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(invalid("side to move must be 'w' or 'b'")),
        };

        // --- Castling ---
        let mut rights = CastlingRights::none();
        if fields[2] != "-" {
            for c in fields[2].chars() {
                match c {
                    'K' => rights.white_kingside = true,
                    'Q' => rights.white_queenside = true,
                    'k' => rights.black_kingside = true,
                    'q' => rights.black_queenside = true,
                    _ => return Err(invalid("bad castling field")),
                }
            }
        }
        state.castling_rights = rights;

        // --- En passant target ---
        state.en_passant_square = match fields[3] {
            "-" => None,
            s => {
                let sq = Square::parse(s).ok_or_else(|| invalid("bad en passant square"))?;
                if sq.rank() != 2 && sq.rank() != 5 { return Err(invalid("en passant square must be on rank 3 or 6")); }
                Some(sq.index())
            }
        };

        // --- Clocks ---
        state.halfmove_clock = match fields.get(4) {
            Some(s) => s.parse().map_err(|_| invalid("bad halfmove clock"))?,
            None => 0,
        };
        state.fullmove_number = match fields.get(5) {
            Some(s) => s.parse().map_err(|_| invalid("bad fullmove number"))?,
            None => 1,
        };

        Ok(state)
    }

    pub(crate) fn to_fen(&self) -> String {
        let mut placement = String::with_capacity(72);
        for rank in (0..8u8).rev() {
            let mut empty_run = 0;
            for file in 0..8u8 {
                match self.get_piece_at(rank * 8 + file) {
                    Some(piece) => {
                        if empty_run > 0 { placement.push_str(&empty_run.to_string()); empty_run = 0; }
                        placement.push(piece.to_char());
                    }
                    None => empty_run += 1,
                }
            }
            if empty_run > 0 { placement.push_str(&empty_run.to_string()); }
            if rank > 0 { placement.push('/'); }
        }

        let rights = self.castling_rights;
        let mut castling = String::new();
        if rights.white_kingside { castling.push('K'); }
        if rights.white_queenside { castling.push('Q'); }
        if rights.black_kingside { castling.push('k'); }
        if rights.black_queenside { castling.push('q'); }
        if castling.is_empty() { castling.push('-'); }

        let en_passant = self.en_passant_square
            .map_or_else(|| "-".to_string(), |sq| Square::from_index(sq).to_string());

        format!("{} {} {} {} {} {}",
            placement, self.turn.letter(), castling, en_passant, self.halfmove_clock, self.fullmove_number)
    }
}
