// src/history.rs
//! Per-color move history, projected from the engine's move log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

use crate::engine::ResolvedMove;
use crate::error::SaveLoadError;
use crate::types::{CastleSide, Color, PieceType, Square};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Ply number within this color's moves, starting at 1.
    pub index: usize,
    pub color: Color,
    pub from: Square,
    pub to: Square,
    pub piece: PieceType,
    pub captured: Option<PieceType>,
    pub promotion: Option<PieceType>,
    pub castle: Option<CastleSide>,
}

impl HistoryEntry {
    fn new(index: usize, mv: &ResolvedMove) -> Self {
        // A castle is shown as a castle and nothing else.
        let is_castle = mv.castle.is_some();
        HistoryEntry {
            index,
            color: mv.color,
            from: mv.from,
            to: mv.to,
            piece: mv.piece,
            captured: if is_castle { None } else { mv.captured },
            promotion: if is_castle { None } else { mv.promotion },
            castle: mv.castle,
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {} -> {} {}", self.index, self.from, self.to, self.piece)?;
        if let Some(side) = self.castle {
            return write!(f, " {}", side.notation());
        }
        if let Some(captured) = self.captured {
            write!(f, " x {}", captured)?;
        }
        if let Some(promotion) = self.promotion {
            write!(f, " = {}", promotion)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    pub white: Vec<HistoryEntry>,
    pub black: Vec<HistoryEntry>,
}

impl Ledger {
    /// Rebuilds both columns from the full log; never patched incrementally.
    pub fn build(log: &[ResolvedMove]) -> Ledger {
        let mut ledger = Ledger::default();
        for mv in log {
            let column = ledger.column_mut(mv.color);
            let index = column.len() + 1;
            column.push(HistoryEntry::new(index, mv));
        }
        ledger
    }

    pub fn column(&self, color: Color) -> &[HistoryEntry] {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn column_mut(&mut self, color: Color) -> &mut Vec<HistoryEntry> {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn len(&self) -> usize {
        self.white.len() + self.black.len()
    }

    pub fn is_empty(&self) -> bool {
        self.white.is_empty() && self.black.is_empty()
    }

    pub fn record(&self, final_fen: String, result: Option<String>) -> GameRecord<'_> {
        GameRecord { final_fen, result, white_moves: &self.white, black_moves: &self.black }
    }
}

/// What `export` writes: the final position, the result if known, and both columns.
#[derive(Debug, Serialize)]
pub struct GameRecord<'a> {
    pub final_fen: String,
    pub result: Option<String>,
    pub white_moves: &'a [HistoryEntry],
    pub black_moves: &'a [HistoryEntry],
}

impl GameRecord<'_> {
    pub fn save_to_file(&self, filename: &str) -> Result<(), SaveLoadError> {
        let json_data = serde_json::to_string_pretty(self)?;
        fs::write(filename, json_data)
            .map_err(|e| SaveLoadError::Io(filename.to_string(), e))?;
        Ok(())
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for color in [Color::White, Color::Black] {
            writeln!(f, "{} History", color)?;
            let column = self.column(color);
            if column.is_empty() {
                writeln!(f, "  (no moves)")?;
            }
            for entry in column {
                writeln!(f, "  {}", entry)?;
            }
        }
        Ok(())
    }
}
