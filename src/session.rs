// src/session.rs
//! The game session: connection lifecycle, matchmaking, color assignment,
//! two-phase move selection and reconciliation with the remote peer.
//!
//! Everything happens in reaction to one of three inputs: user selections
//! ([`GameSession::select_square`], [`GameSession::choose_promotion`]), inbound
//! frames ([`GameSession::on_frame`]) and transport lifecycle calls. Nothing
//! blocks. Changes the presentation layer should react to are queued as
//! [`SessionEvent`]s and collected with [`GameSession::drain_events`].

use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::codec::{self, ClientMessage, ServerMessage, WireMove};
use crate::engine::{BoardStatus, DrawReason, MoveIntent, Outcome, Position, ResolvedMove};
use crate::error::{MoveError, SessionError};
use crate::history::Ledger;
use crate::transport::Transport;
use crate::types::{Color, PieceType, Square};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState { Disconnected, Connecting, Connected }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState { Idle, Queued, Active, Concluded }

/// Informational matchmaking flag, independent of [`MatchState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueStatus { #[default] Normal, Full }

/// Two-phase move entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Idle,
    /// An own piece is picked; its legal destinations are cached, split by kind.
    PendingDestination { from: Square, quiet: Vec<Square>, captures: Vec<Square> },
    /// The move needs a promotion piece before it can be submitted.
    PendingPromotion { from: Square, to: Square },
}

/// Why a match ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conclusion {
    /// `game_over` from the server, winner as reported.
    Reported { winner: Option<String> },
    /// The connection dropped mid-game.
    Forfeit,
    /// A remote move could not be applied to the local board.
    Desync { lan: String, reason: MoveError },
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conclusion::Reported { winner: Some(winner) } => write!(f, "Game over. Winner: {}", winner),
            Conclusion::Reported { winner: None } => write!(f, "Game over."),
            Conclusion::Forfeit => write!(f, "Game over. Connection lost, the game is forfeited."),
            Conclusion::Desync { lan, reason } => write!(f, "Game aborted. Board out of sync at {}: {}", lan, reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    ConnectionLost { reason: String },
    Queued,
    WaitingForOpponent,
    QueueFull,
    GameStarted { color: Color },
    LocalMoveApplied(ResolvedMove),
    RemoteMoveApplied(ResolvedMove),
    PromotionRequired { from: Square, to: Square },
    PromotionCancelled,
    /// A local move the engine refused. Selection has been cleared.
    MoveRejected { intent: MoveIntent, reason: MoveError },
    /// A remote move the engine refused. The match is over.
    Desynced { lan: String, reason: MoveError },
    FrameDiscarded { reason: String },
    /// Checkmate or draw seen on the local board; the server still decides.
    LocalTerminal(Outcome),
    GameOver(Conclusion),
    Reset,
}

/// Status line for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Connecting,
    Idle,
    Waiting,
    QueueFull,
    YourTurn,
    OpponentTurn,
    Checkmate { winner: Color },
    Draw(DrawReason),
    Concluded(Conclusion),
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Banner::Connecting => write!(f, "Connecting..."),
            Banner::Idle => write!(f, "Play Game"),
            Banner::Waiting => write!(f, "Waiting for opponent..."),
            Banner::QueueFull => write!(f, "Game queue is full. Try again later."),
            Banner::YourTurn => write!(f, "Your turn"),
            Banner::OpponentTurn => write!(f, "Opponent turn"),
            Banner::Checkmate { winner } => write!(f, "Checkmate! Winner is {}.", winner),
            Banner::Draw(reason) => write!(f, "Draw ({:?})", reason),
            Banner::Concluded(conclusion) => write!(f, "{}", conclusion),
        }
    }
}

/// What a call to [`GameSession::select_square`] or
/// [`GameSession::choose_promotion`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Nothing changed.
    Ignored,
    Selected { from: Square, quiet: Vec<Square>, captures: Vec<Square> },
    /// The square was not a legal destination; the selection is dropped.
    Cancelled,
    PromotionRequired { from: Square, to: Square },
    Applied(ResolvedMove),
    Rejected(MoveError),
    /// The engine accepted the move but the transport dropped before it was sent.
    NotSent,
}

pub struct GameSession<T: Transport> {
    transport: T,
    connection_state: ConnectionState,
    match_state: MatchState,
    assigned_color: Option<Color>,
    board: Position,
    ledger: Ledger,
    status: BoardStatus,
    selection: Selection,
    queue_status: QueueStatus,
    conclusion: Option<Conclusion>,
    events: VecDeque<SessionEvent>,
}

impl<T: Transport> GameSession<T> {
    pub fn new(transport: T) -> Self {
        let board = Position::initial();
        let status = board.status();
        GameSession {
            transport,
            connection_state: ConnectionState::Disconnected,
            match_state: MatchState::Idle,
            assigned_color: None,
            board,
            ledger: Ledger::default(),
            status,
            selection: Selection::Idle,
            queue_status: QueueStatus::Normal,
            conclusion: None,
            events: VecDeque::new(),
        }
    }

    // --- Accessors ---

    pub fn connection_state(&self) -> ConnectionState { self.connection_state }
    pub fn match_state(&self) -> MatchState { self.match_state }
    pub fn assigned_color(&self) -> Option<Color> { self.assigned_color }
    pub fn board(&self) -> &Position { &self.board }
    pub fn ledger(&self) -> &Ledger { &self.ledger }
    pub fn status(&self) -> BoardStatus { self.status }
    pub fn selection(&self) -> &Selection { &self.selection }
    pub fn queue_status(&self) -> QueueStatus { self.queue_status }
    pub fn conclusion(&self) -> Option<&Conclusion> { self.conclusion.as_ref() }
    pub fn transport(&self) -> &T { &self.transport }
    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    /// The move waiting on a promotion choice, if any.
    pub fn pending_local_move(&self) -> Option<MoveIntent> {
        match self.selection {
            Selection::PendingPromotion { from, to } => Some(MoveIntent::new(from, to)),
            _ => None,
        }
    }

    /// True while the match is live and the board says it is our move.
    pub fn is_my_turn(&self) -> bool {
        self.match_state == MatchState::Active && self.assigned_color == Some(self.board.turn())
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn banner(&self) -> Banner {
        if let Some(conclusion) = &self.conclusion {
            return Banner::Concluded(conclusion.clone());
        }
        if self.connection_state != ConnectionState::Connected {
            return Banner::Connecting;
        }
        match self.match_state {
            MatchState::Idle | MatchState::Queued if self.queue_status == QueueStatus::Full => Banner::QueueFull,
            MatchState::Idle => Banner::Idle,
            MatchState::Queued => Banner::Waiting,
            MatchState::Active => match self.status.outcome() {
                Some(Outcome::Checkmate { winner }) => Banner::Checkmate { winner },
                Some(Outcome::Draw(reason)) => Banner::Draw(reason),
                None if self.is_my_turn() => Banner::YourTurn,
                None => Banner::OpponentTurn,
            },
            // Concluded always carries a conclusion; handled above
            MatchState::Concluded => Banner::Idle,
        }
    }

    // --- Lifecycle ---

    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.connection_state == ConnectionState::Connected {
            return Ok(());
        }
        self.connection_state = ConnectionState::Connecting;
        match self.transport.open() {
            Ok(()) => {
                self.connection_state = ConnectionState::Connected;
                info!("connected to game server");
                self.events.push_back(SessionEvent::Connected);
                Ok(())
            }
            Err(e) => {
                self.drop_connection(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Closes the transport from our side.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.drop_connection("closed by client");
    }

    /// To be called by the socket owner when the peer or network closed the channel.
    pub fn on_transport_closed(&mut self) {
        self.drop_connection("closed by server");
    }

    fn drop_connection(&mut self, reason: &str) {
        let was = self.connection_state;
        self.connection_state = ConnectionState::Disconnected;
        self.selection = Selection::Idle;
        warn!(?was, reason, "connection lost");
        self.events.push_back(SessionEvent::ConnectionLost { reason: reason.to_string() });

        match self.match_state {
            MatchState::Active => self.conclude(Conclusion::Forfeit),
            // The server forgets our queue slot with the socket.
            MatchState::Queued => self.match_state = MatchState::Idle,
            MatchState::Idle | MatchState::Concluded => {}
        }
    }

    /// Asks the server for a game. Fire-and-forget: the match becomes Queued locally right away.
    pub fn request_play(&mut self) -> Result<(), SessionError> {
        if self.connection_state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        if self.match_state != MatchState::Idle {
            return Err(SessionError::NotIdle(self.match_state));
        }
        self.queue_status = QueueStatus::Normal;
        self.send(&ClientMessage::InitGame)?;
        self.match_state = MatchState::Queued;
        info!("requested a game");
        self.events.push_back(SessionEvent::Queued);
        Ok(())
    }

    /// Concluded back to Idle, ready for a rematch.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.match_state != MatchState::Concluded {
            return Err(SessionError::NotConcluded(self.match_state));
        }
        self.match_state = MatchState::Idle;
        self.assigned_color = None;
        self.conclusion = None;
        self.queue_status = QueueStatus::Normal;
        self.selection = Selection::Idle;
        self.replace_board(Position::initial());
        info!("session reset");
        self.events.push_back(SessionEvent::Reset);
        Ok(())
    }

    // --- Inbound ---

    /// Decodes and dispatches one inbound frame. Malformed frames are dropped.
    pub fn on_frame(&mut self, frame: &str) {
        match codec::decode(frame) {
            Ok(msg) => {
                debug!(kind = msg.kind(), "inbound frame");
                self.dispatch(msg);
            }
            Err(e) => {
                warn!(%e, frame, "discarding malformed frame");
                self.events.push_back(SessionEvent::FrameDiscarded { reason: e.to_string() });
            }
        }
    }

    fn dispatch(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::GameInitiated { color } => self.on_remote_init_assigned(color),
            ServerMessage::MoveApplied(mv) => self.on_remote_move(mv),
            ServerMessage::GameOver { winner } => self.on_remote_game_over(winner),
            ServerMessage::WaitingForOpponent => self.on_remote_waiting(),
            ServerMessage::QueueFull => self.on_remote_queue_full(),
            ServerMessage::Unknown(kind) => debug!(%kind, "ignoring unknown frame type"),
        }
    }

    /// The only way a match becomes Active.
    pub fn on_remote_init_assigned(&mut self, color: Color) {
        if self.match_state != MatchState::Queued {
            debug!(state = ?self.match_state, "game assigned without a pending request");
        }
        self.replace_board(Position::initial());
        self.assigned_color = Some(color);
        self.match_state = MatchState::Active;
        self.queue_status = QueueStatus::Normal;
        self.selection = Selection::Idle;
        self.conclusion = None;
        info!(%color, "match started");
        self.events.push_back(SessionEvent::GameStarted { color });
    }

    pub fn on_remote_waiting(&mut self) {
        debug!(state = ?self.match_state, "server is looking for an opponent");
        self.events.push_back(SessionEvent::WaitingForOpponent);
    }

    pub fn on_remote_queue_full(&mut self) {
        match self.match_state {
            MatchState::Idle | MatchState::Queued => {
                self.queue_status = QueueStatus::Full;
                warn!("matchmaking queue is full");
                self.events.push_back(SessionEvent::QueueFull);
            }
            state => debug!(?state, "ignoring queue-full notice"),
        }
    }

    /// Applies the opponent's ply. Remote moves are authoritative: turn gating is not
    /// consulted. A move the local engine refuses ends the match as a desync.
    pub fn on_remote_move(&mut self, mv: WireMove) {
        if self.match_state != MatchState::Active {
            warn!(state = ?self.match_state, lan = %mv.lan, "move received outside an active match");
            return;
        }
        match self.board.play(&mv.intent()) {
            Ok((next, resolved)) => {
                debug!(lan = %resolved.lan, "remote move applied");
                self.commit(next);
                self.events.push_back(SessionEvent::RemoteMoveApplied(resolved));
            }
            Err(reason) => {
                error!(lan = %mv.lan, %reason, fen = %self.board.to_fen(), "remote move does not fit the local board");
                self.events.push_back(SessionEvent::Desynced { lan: mv.lan.clone(), reason: reason.clone() });
                self.conclude(Conclusion::Desync { lan: mv.lan, reason });
            }
        }
    }

    /// The server's ruling stands, whatever the local board says.
    pub fn on_remote_game_over(&mut self, winner: Option<String>) {
        info!(winner = winner.as_deref().unwrap_or("none"), "server ended the game");
        if let Some(local) = self.status.outcome() {
            debug!(%local, "local board had reached a terminal state");
        }
        self.conclude(Conclusion::Reported { winner });
    }

    // --- Local intents ---

    pub fn select_square(&mut self, square: Square) -> SelectOutcome {
        match std::mem::take(&mut self.selection) {
            Selection::Idle => self.select_origin(square),
            Selection::PendingDestination { from, quiet, captures } => {
                if !quiet.contains(&square) && !captures.contains(&square) {
                    debug!(%from, %square, "selection cancelled");
                    return SelectOutcome::Cancelled;
                }
                if let Some(prompt) = self.prompt_for_promotion(from, square) {
                    return prompt;
                }
                self.accept(MoveIntent::new(from, square))
            }
            pending @ Selection::PendingPromotion { .. } => {
                // The promotion prompt stays open until answered or cancelled
                self.selection = pending;
                SelectOutcome::Ignored
            }
        }
    }

    /// Phase one: only an own piece, on our turn, with somewhere to go.
    fn select_origin(&mut self, square: Square) -> SelectOutcome {
        if !self.is_my_turn() {
            return SelectOutcome::Ignored;
        }
        let owns_piece = self.board.piece_at(square)
            .is_some_and(|piece| Some(piece.color) == self.assigned_color);
        if !owns_piece {
            return SelectOutcome::Ignored;
        }

        let mut quiet = Vec::new();
        let mut captures = Vec::new();
        for mv in self.board.legal_moves_from(square) {
            let bucket = if mv.is_capture() { &mut captures } else { &mut quiet };
            if !bucket.contains(&mv.to()) { bucket.push(mv.to()); }
        }
        if quiet.is_empty() && captures.is_empty() {
            return SelectOutcome::Ignored;
        }

        self.selection = Selection::PendingDestination { from: square, quiet: quiet.clone(), captures: captures.clone() };
        SelectOutcome::Selected { from: square, quiet, captures }
    }

    /// Both phases at once, for moves typed as `e2e4` or `a7a8q`. Gated like
    /// [`Self::select_square`]; a promotion without a piece opens the prompt.
    pub fn submit_move(&mut self, intent: MoveIntent) -> SelectOutcome {
        if !self.is_my_turn() || matches!(self.selection, Selection::PendingPromotion { .. }) {
            return SelectOutcome::Ignored;
        }
        self.selection = Selection::Idle;
        if intent.promotion.is_none() {
            if let Some(prompt) = self.prompt_for_promotion(intent.from, intent.to) {
                return prompt;
            }
        }
        self.accept(intent)
    }

    /// Opens the promotion prompt when `from -> to` is a legal promoting move.
    fn prompt_for_promotion(&mut self, from: Square, to: Square) -> Option<SelectOutcome> {
        let needs_promotion = self.board.legal_moves_from(from).iter()
            .any(|mv| mv.to() == to && mv.promotion().is_some());
        if !needs_promotion {
            return None;
        }
        self.selection = Selection::PendingPromotion { from, to };
        self.events.push_back(SessionEvent::PromotionRequired { from, to });
        Some(SelectOutcome::PromotionRequired { from, to })
    }

    pub fn choose_promotion(&mut self, kind: PieceType) -> Result<SelectOutcome, SessionError> {
        let (from, to) = match self.selection {
            Selection::PendingPromotion { from, to } => (from, to),
            _ => return Err(SessionError::NoPendingPromotion),
        };
        if !kind.is_promotion_choice() {
            return Err(SessionError::InvalidPromotionPiece(kind));
        }
        self.selection = Selection::Idle;
        Ok(self.accept(MoveIntent::new(from, to).with_promotion(kind)))
    }

    /// Dismisses the promotion prompt without moving. Returns whether one was open.
    pub fn cancel_promotion(&mut self) -> bool {
        if !matches!(self.selection, Selection::PendingPromotion { .. }) {
            return false;
        }
        self.selection = Selection::Idle;
        self.events.push_back(SessionEvent::PromotionCancelled);
        true
    }

    // --- Shared paths ---

    /// Submits a local move: engine check, then wire send, then board update.
    fn accept(&mut self, intent: MoveIntent) -> SelectOutcome {
        self.selection = Selection::Idle;
        let (next, resolved) = match self.board.play(&intent) {
            Ok(played) => played,
            Err(reason) => {
                warn!(lan = %intent.lan(), %reason, "engine rejected a pre-filtered move");
                self.events.push_back(SessionEvent::MoveRejected { intent, reason: reason.clone() });
                return SelectOutcome::Rejected(reason);
            }
        };

        if self.send(&ClientMessage::Move(WireMove::from(&resolved))).is_err() {
            return SelectOutcome::NotSent;
        }
        debug!(lan = %resolved.lan, "local move sent");
        self.commit(next);
        self.events.push_back(SessionEvent::LocalMoveApplied(resolved.clone()));
        SelectOutcome::Applied(resolved)
    }

    /// Installs an accepted successor position and refreshes everything derived from it.
    fn commit(&mut self, next: Position) {
        self.selection = Selection::Idle;
        self.replace_board(next);
        if let Some(outcome) = self.status.outcome() {
            info!(%outcome, "local board reached a terminal state, awaiting the server");
            self.events.push_back(SessionEvent::LocalTerminal(outcome));
        }
    }

    fn replace_board(&mut self, board: Position) {
        self.board = board;
        self.ledger = Ledger::build(self.board.moves());
        self.status = self.board.status();
    }

    fn conclude(&mut self, conclusion: Conclusion) {
        self.match_state = MatchState::Concluded;
        self.selection = Selection::Idle;
        self.conclusion = Some(conclusion.clone());
        self.events.push_back(SessionEvent::GameOver(conclusion));
    }

    /// A failed send is treated as the transport dropping.
    fn send(&mut self, msg: &ClientMessage) -> Result<(), SessionError> {
        let frame = codec::encode(msg)?;
        if let Err(e) = self.transport.send(&frame) {
            self.drop_connection(&e.to_string());
            return Err(e.into());
        }
        debug!(%frame, "outbound frame");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    fn active(color: Color) -> GameSession<MemoryTransport> {
        let mut session = GameSession::new(MemoryTransport::new());
        session.connect().unwrap();
        session.request_play().unwrap();
        session.on_remote_init_assigned(color);
        session.drain_events();
        session
    }

    #[test]
    fn banner_follows_lifecycle() {
        let mut session = GameSession::new(MemoryTransport::new());
        assert_eq!(session.banner(), Banner::Connecting);
        session.connect().unwrap();
        assert_eq!(session.banner(), Banner::Idle);
        session.request_play().unwrap();
        assert_eq!(session.banner(), Banner::Waiting);
        session.on_remote_init_assigned(Color::Black);
        assert_eq!(session.banner(), Banner::OpponentTurn);
        assert_eq!(session.banner().to_string(), "Opponent turn");
    }

    #[test]
    fn selection_caches_quiet_and_capture_destinations() {
        let mut session = active(Color::White);
        session.select_square(sq("e2"));
        session.select_square(sq("e4"));
        session.on_frame(r#"{"type":"move","payload":{"move":{"from":"d7","to":"d5"}}}"#);
        match session.select_square(sq("e4")) {
            SelectOutcome::Selected { quiet, captures, .. } => {
                assert_eq!(quiet, vec![sq("e5")]);
                assert_eq!(captures, vec![sq("d5")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn promotion_prompt_blocks_other_selections() {
        let mut session = active(Color::White);
        session.selection = Selection::PendingPromotion { from: sq("a7"), to: sq("a8") };
        assert_eq!(session.select_square(sq("e2")), SelectOutcome::Ignored);
        assert_eq!(session.pending_local_move(), Some(MoveIntent::new(sq("a7"), sq("a8"))));
        assert!(session.cancel_promotion());
        assert_eq!(session.pending_local_move(), None);
        assert!(!session.cancel_promotion());
    }

    #[test]
    fn choose_promotion_without_prompt_is_an_error() {
        let mut session = active(Color::White);
        assert!(matches!(session.choose_promotion(PieceType::Queen), Err(SessionError::NoPendingPromotion)));
    }

    #[test]
    fn failed_send_counts_as_a_drop() {
        let mut session = active(Color::White);
        session.transport_mut().set_fail_sends(true);
        session.select_square(sq("e2"));
        assert_eq!(session.select_square(sq("e4")), SelectOutcome::NotSent);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(session.match_state(), MatchState::Concluded);
        assert_eq!(session.conclusion(), Some(&Conclusion::Forfeit));
        assert!(session.board().moves().is_empty());
    }
}
