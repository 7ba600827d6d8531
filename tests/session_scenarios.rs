use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use chess_session::codec::{self, ClientMessage, WireMove};
use chess_session::engine::STARTING_FEN;
use chess_session::{
    Banner, CastleSide, Color, Conclusion, ConnectionState, DrawReason, GameSession, Ledger, MatchState, MemoryTransport,
    MoveError, MoveIntent, Outcome, PieceType, Position, QueueStatus, SelectOutcome, Selection, SessionError,
    SessionEvent, Square, Transport,
};

type Session = GameSession<MemoryTransport>;

fn sq(s: &str) -> Square {
    Square::parse(s).unwrap()
}

fn init_frame(color: &str) -> String {
    format!(r#"{{"type":"init_game","payload":{{"color":"{color}"}}}}"#)
}

fn move_frame(intent: &MoveIntent) -> String {
    codec::encode(&ClientMessage::Move(WireMove::from_intent(intent))).unwrap()
}

fn last_frame(session: &Session) -> Value {
    serde_json::from_str(session.transport().last_sent().unwrap()).unwrap()
}

fn started(color: &str) -> Session {
    let mut session = GameSession::new(MemoryTransport::new());
    session.connect().unwrap();
    session.request_play().unwrap();
    session.on_frame(&init_frame(color));
    session.drain_events();
    session
}

/// Plays a move for the local side through both selection phases.
fn local(session: &mut Session, lan: &str) -> SelectOutcome {
    let intent = MoveIntent::parse_lan(lan).unwrap();
    assert!(matches!(session.select_square(intent.from), SelectOutcome::Selected { .. }), "cannot select {}", intent.from);
    match session.select_square(intent.to) {
        SelectOutcome::PromotionRequired { .. } => {
            session.choose_promotion(intent.promotion.unwrap_or(PieceType::Queen)).unwrap()
        }
        outcome => outcome,
    }
}

fn remote(session: &mut Session, lan: &str) {
    session.on_frame(&move_frame(&MoveIntent::parse_lan(lan).unwrap()));
}

/// Every field the presentation layer can observe.
#[derive(Debug, PartialEq)]
struct Snapshot {
    connection: ConnectionState,
    match_state: MatchState,
    color: Option<Color>,
    fen: String,
    moves: usize,
    selection: Selection,
    queue: QueueStatus,
    conclusion: Option<Conclusion>,
    ledger: Ledger,
    banner: Banner,
    sent: usize,
}

fn snapshot(session: &Session) -> Snapshot {
    Snapshot {
        connection: session.connection_state(),
        match_state: session.match_state(),
        color: session.assigned_color(),
        fen: session.board().to_fen(),
        moves: session.board().moves().len(),
        selection: session.selection().clone(),
        queue: session.queue_status(),
        conclusion: session.conclusion().cloned(),
        ledger: session.ledger().clone(),
        banner: session.banner(),
        sent: session.transport().sent().len(),
    }
}

// --- Matchmaking ---

#[test]
fn init_game_assigns_white_and_starts_from_the_initial_position() {
    let mut session = GameSession::new(MemoryTransport::new());
    session.connect().unwrap();
    session.request_play().unwrap();
    assert_eq!(session.transport().last_sent(), Some(r#"{"type":"init_game"}"#));
    assert_eq!(session.match_state(), MatchState::Queued);
    assert_eq!(session.assigned_color(), None);

    session.on_frame(r#"{"type":"waiting_for_player"}"#);
    assert_eq!(session.match_state(), MatchState::Queued);
    assert_eq!(session.banner(), Banner::Waiting);

    session.on_frame(&init_frame("white"));
    assert_eq!(session.match_state(), MatchState::Active);
    assert_eq!(session.assigned_color(), Some(Color::White));
    assert_eq!(session.board().to_fen(), STARTING_FEN);
    assert_eq!(session.selection(), &Selection::Idle);
    assert_eq!(session.banner(), Banner::YourTurn);
    assert!(session.drain_events().contains(&SessionEvent::GameStarted { color: Color::White }));
}

#[test]
fn queue_full_while_queued_keeps_the_match_state() {
    let mut session = GameSession::new(MemoryTransport::new());
    session.connect().unwrap();
    session.request_play().unwrap();
    session.on_frame(r#"{"type":"game_queue_full"}"#);
    assert_eq!(session.queue_status(), QueueStatus::Full);
    assert_eq!(session.match_state(), MatchState::Queued);
    assert_eq!(session.banner(), Banner::QueueFull);

    session.on_frame(&init_frame("black"));
    assert_eq!(session.queue_status(), QueueStatus::Normal);
}

#[test]
fn new_play_request_clears_queue_full() {
    let mut session = GameSession::new(MemoryTransport::new());
    session.connect().unwrap();
    session.on_remote_queue_full();
    assert_eq!(session.queue_status(), QueueStatus::Full);
    session.request_play().unwrap();
    assert_eq!(session.queue_status(), QueueStatus::Normal);
}

#[test]
fn play_requires_an_idle_connected_session() {
    let mut session = GameSession::new(MemoryTransport::new());
    assert!(matches!(session.request_play(), Err(SessionError::NotConnected)));
    session.connect().unwrap();
    session.request_play().unwrap();
    assert!(matches!(session.request_play(), Err(SessionError::NotIdle(MatchState::Queued))));
    assert_eq!(session.transport().sent().len(), 1);
}

#[test]
fn refused_connection_stays_disconnected() {
    let mut session = GameSession::new(MemoryTransport::refusing());
    assert!(matches!(session.connect(), Err(SessionError::Transport(_))));
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(session.drain_events().as_slice(), [SessionEvent::ConnectionLost { .. }]));
    assert_eq!(session.banner(), Banner::Connecting);

    session.transport_mut().set_refuse_connections(false);
    session.connect().unwrap();
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

// --- Local moves ---

#[test]
fn white_plays_e2_e4() {
    let mut session = started("white");
    match session.select_square(sq("e2")) {
        SelectOutcome::Selected { from, quiet, captures } => {
            assert_eq!(from, sq("e2"));
            assert!(quiet.contains(&sq("e4")));
            assert!(quiet.contains(&sq("e3")));
            assert!(captures.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(session.select_square(sq("e4")), SelectOutcome::Applied(_)));

    let frame = last_frame(&session);
    assert_eq!(frame["type"], "move");
    assert_eq!(frame["payload"]["move"]["from"], "e2");
    assert_eq!(frame["payload"]["move"]["to"], "e4");
    assert_eq!(session.board().turn(), Color::Black);
    assert_eq!(session.selection(), &Selection::Idle);
    assert_eq!(session.pending_local_move(), None);
    assert_eq!(session.banner(), Banner::OpponentTurn);
}

#[test]
fn selecting_what_is_not_ours_changes_nothing() {
    let mut session = started("white");
    let before = snapshot(&session);
    for square in ["e7", "e4", "d8"] {
        assert_eq!(session.select_square(sq(square)), SelectOutcome::Ignored);
        assert_eq!(snapshot(&session), before);
    }

    local(&mut session, "e2e4");
    // Our own piece, but the opponent is to move
    let before = snapshot(&session);
    assert_eq!(session.select_square(sq("d2")), SelectOutcome::Ignored);
    assert_eq!(snapshot(&session), before);

    // Black before White has moved
    let mut black = started("black");
    let before = snapshot(&black);
    assert_eq!(black.select_square(sq("e7")), SelectOutcome::Ignored);
    assert_eq!(snapshot(&black), before);
}

#[test]
fn pieces_without_moves_cannot_be_selected() {
    let mut session = started("white");
    assert_eq!(session.select_square(sq("a1")), SelectOutcome::Ignored);
    assert_eq!(session.selection(), &Selection::Idle);
}

#[test]
fn clicking_a_non_destination_cancels_the_selection() {
    let mut session = started("white");
    session.select_square(sq("e2"));
    assert_eq!(session.select_square(sq("e5")), SelectOutcome::Cancelled);
    assert_eq!(session.selection(), &Selection::Idle);
    assert_eq!(session.board().to_fen(), STARTING_FEN);
    assert!(session.transport().sent().len() == 1);
    assert!(matches!(session.select_square(sq("g1")), SelectOutcome::Selected { .. }));
}

#[test]
fn promotion_waits_for_a_piece_choice() {
    let mut session = started("white");
    for (mine, theirs) in [("b2b4", "h7h6"), ("b4b5", "h6h5"), ("b5b6", "h5h4"), ("b6a7", "h4h3")] {
        assert!(matches!(local(&mut session, mine), SelectOutcome::Applied(_)));
        remote(&mut session, theirs);
    }
    session.drain_events();

    session.select_square(sq("a7"));
    let before_fen = session.board().to_fen();
    let sent_before = session.transport().sent().len();
    assert_eq!(
        session.select_square(sq("b8")),
        SelectOutcome::PromotionRequired { from: sq("a7"), to: sq("b8") }
    );
    assert_eq!(session.pending_local_move(), Some(MoveIntent::new(sq("a7"), sq("b8"))));
    assert_eq!(session.board().to_fen(), before_fen);
    assert_eq!(session.transport().sent().len(), sent_before);

    match session.choose_promotion(PieceType::Queen).unwrap() {
        SelectOutcome::Applied(mv) => {
            assert_eq!(mv.promotion, Some(PieceType::Queen));
            assert_eq!(mv.captured, Some(PieceType::Knight));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.pending_local_move(), None);
    assert_eq!(session.board().piece_at(sq("b8")).map(|p| (p.kind, p.color)), Some((PieceType::Queen, Color::White)));
    assert_eq!(last_frame(&session)["payload"]["move"]["promotion"], "q");

    let entry = session.ledger().white.last().unwrap();
    assert_eq!(entry.promotion, Some(PieceType::Queen));
    assert_eq!(entry.index, 5);
}

#[test]
fn promotion_choice_must_be_a_promotable_piece() {
    let mut session = started("white");
    for (mine, theirs) in [("b2b4", "h7h6"), ("b4b5", "h6h5"), ("b5b6", "h5h4"), ("b6a7", "h4h3")] {
        local(&mut session, mine);
        remote(&mut session, theirs);
    }
    assert!(matches!(session.submit_move(MoveIntent::new(sq("a7"), sq("b8"))), SelectOutcome::PromotionRequired { .. }));
    assert!(matches!(session.choose_promotion(PieceType::King), Err(SessionError::InvalidPromotionPiece(PieceType::King))));
    assert!(session.pending_local_move().is_some());
    assert!(session.cancel_promotion());
    assert_eq!(session.pending_local_move(), None);
    assert_eq!(session.board().turn(), Color::White);
}

#[test]
fn rejected_local_move_is_discarded_and_observable() {
    let mut session = started("white");
    session.select_square(sq("e2"));
    let sent_before = session.transport().sent().len();

    let outcome = session.submit_move(MoveIntent::parse_lan("e2e5").unwrap());
    assert!(matches!(outcome, SelectOutcome::Rejected(MoveError::IllegalMovePattern(_))));
    assert_eq!(session.selection(), &Selection::Idle);
    assert_eq!(session.board().to_fen(), STARTING_FEN);
    assert_eq!(session.transport().sent().len(), sent_before);
    assert!(session.drain_events().iter().any(|e| matches!(e, SessionEvent::MoveRejected { .. })));
}

#[test]
fn castling_shows_in_the_ledger() {
    let mut session = started("white");
    for (mine, theirs) in [("e2e4", "e7e5"), ("g1f3", "b8c6"), ("f1c4", "f8c5")] {
        local(&mut session, mine);
        remote(&mut session, theirs);
    }
    match local(&mut session, "e1g1") {
        SelectOutcome::Applied(mv) => assert_eq!(mv.castle, Some(CastleSide::Kingside)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(last_frame(&session)["payload"]["move"]["flags"], "k");
    assert_eq!(session.ledger().white[3].to_string(), "4. e1 -> g1 King O-O");
}

// --- Remote input ---

#[test]
fn unknown_frames_change_nothing() {
    let mut session = started("white");
    session.select_square(sq("e2"));
    let before = snapshot(&session);
    session.on_frame(r#"{"type":"ping"}"#);
    session.on_frame(r#"{"type":"ping","payload":{"at":123}}"#);
    assert_eq!(snapshot(&session), before);
    assert!(session.drain_events().is_empty());
}

#[test]
fn malformed_frames_are_discarded() {
    let mut session = started("black");
    remote(&mut session, "e2e4");
    session.drain_events();
    let before = snapshot(&session);

    for frame in ["{", r#"{"payload":{}}"#, r#"{"type":"move"}"#, r#"{"type":"move","payload":{"move":{"from":"e7"}}}"#,
                  r#"{"type":"init_game","payload":{"color":"purple"}}"#] {
        session.on_frame(frame);
    }
    assert_eq!(snapshot(&session), before);
    let events = session.drain_events();
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| matches!(e, SessionEvent::FrameDiscarded { .. })));
}

#[test]
fn remote_moves_ignore_local_turn_gating() {
    let mut session = started("black");
    remote(&mut session, "e2e4");
    assert_eq!(session.board().turn(), Color::Black);
    assert_eq!(session.banner(), Banner::YourTurn);
    assert!(session.drain_events().iter().any(|e| matches!(e, SessionEvent::RemoteMoveApplied(mv) if mv.lan == "e2e4")));
    assert_eq!(session.ledger().white.len(), 1);
}

#[test]
fn unappliable_remote_move_is_a_desync() {
    let mut session = started("white");
    let fen = session.board().to_fen();
    remote(&mut session, "e7e5"); // Black piece while White is to move

    assert_eq!(session.board().to_fen(), fen);
    assert_eq!(session.match_state(), MatchState::Concluded);
    assert!(matches!(session.conclusion(), Some(Conclusion::Desync { reason: MoveError::NotPlayersTurn, .. })));
    assert!(session.drain_events().iter().any(|e| matches!(e, SessionEvent::Desynced { .. })));

    // A later server ruling still replaces it
    session.on_frame(r#"{"type":"game_over","payload":{"winner":"black"}}"#);
    assert_eq!(session.conclusion(), Some(&Conclusion::Reported { winner: Some("black".into()) }));
}

#[test]
fn server_game_over_wins_over_local_detection() {
    let mut session = started("white");
    local(&mut session, "f2f3");
    remote(&mut session, "e7e5");
    local(&mut session, "g2g4");
    remote(&mut session, "d8h4");

    assert!(session.drain_events().contains(&SessionEvent::LocalTerminal(Outcome::Checkmate { winner: Color::Black })));
    assert_eq!(session.match_state(), MatchState::Active);
    assert_eq!(session.banner(), Banner::Checkmate { winner: Color::Black });
    assert_eq!(session.board().checked_king(), Some(sq("e1")));

    session.on_frame(r#"{"type":"game_over","payload":{"winner":"white"}}"#);
    assert_eq!(session.match_state(), MatchState::Concluded);
    assert_eq!(session.conclusion(), Some(&Conclusion::Reported { winner: Some("white".into()) }));
    assert!(matches!(session.banner(), Banner::Concluded(_)));
}

#[test]
fn moves_after_the_match_ended_are_dropped() {
    let mut session = started("black");
    session.on_frame(r#"{"type":"game_over"}"#);
    remote(&mut session, "e2e4");
    assert!(session.board().moves().is_empty());
}

// --- Transport loss ---

#[test]
fn dropped_connection_forfeits_and_clears_the_promotion_prompt() {
    let mut session = started("white");
    for (mine, theirs) in [("b2b4", "h7h6"), ("b4b5", "h6h5"), ("b5b6", "h5h4"), ("b6a7", "h4h3")] {
        local(&mut session, mine);
        remote(&mut session, theirs);
    }
    session.select_square(sq("a7"));
    session.select_square(sq("b8"));
    assert!(session.pending_local_move().is_some());

    session.on_transport_closed();
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.pending_local_move(), None);
    assert_eq!(session.selection(), &Selection::Idle);
    assert_eq!(session.match_state(), MatchState::Concluded);
    assert_eq!(session.conclusion(), Some(&Conclusion::Forfeit));
    assert!(matches!(session.choose_promotion(PieceType::Queen), Err(SessionError::NoPendingPromotion)));
}

#[test]
fn disconnect_while_queued_returns_to_idle() {
    let mut session = GameSession::new(MemoryTransport::new());
    session.connect().unwrap();
    session.request_play().unwrap();
    session.disconnect();
    assert_eq!(session.match_state(), MatchState::Idle);
    assert!(!session.transport().is_open());
    session.connect().unwrap();
    session.request_play().unwrap();
}

#[test]
fn reset_after_conclusion_allows_a_rematch() {
    let mut session = started("white");
    assert!(matches!(session.reset(), Err(SessionError::NotConcluded(MatchState::Active))));
    local(&mut session, "d2d4");
    session.on_frame(r#"{"type":"game_over","payload":{"winner":"black"}}"#);

    session.reset().unwrap();
    assert_eq!(session.match_state(), MatchState::Idle);
    assert_eq!(session.assigned_color(), None);
    assert_eq!(session.board().to_fen(), STARTING_FEN);
    assert!(session.ledger().is_empty());
    assert_eq!(session.banner(), Banner::Idle);
    session.request_play().unwrap();
    assert_eq!(session.match_state(), MatchState::Queued);
}

#[test]
fn endless_knight_shuffle_keeps_the_session_alive() {
    let mut session = started("black");
    for _ in 0..300 {
        remote(&mut session, "g1f3");
        assert!(matches!(session.submit_move(MoveIntent::parse_lan("g8f6").unwrap()), SelectOutcome::Applied(_)));
        remote(&mut session, "f3g1");
        assert!(matches!(session.submit_move(MoveIntent::parse_lan("f6g8").unwrap()), SelectOutcome::Applied(_)));
    }

    assert_eq!(session.board().moves().len(), 1200);
    assert_eq!(session.board().to_fen().split(' ').next(), STARTING_FEN.split(' ').next());
    assert_eq!(session.board().repetition_count(), 301);
    // The fifty-move rule is checked before repetition
    assert_eq!(session.banner(), Banner::Draw(DrawReason::FiftyMoveRule));
    // Local draws are advisory; the server has not ended the game
    assert_eq!(session.match_state(), MatchState::Active);
    assert_eq!(session.ledger().len(), 1200);
}

// --- Properties ---

/// Random legal games through the session match the same games played on a bare `Position`.
#[test]
fn session_and_engine_never_diverge() {
    for (seed, color) in [(1u64, "white"), (2, "black"), (3, "white"), (4, "black")] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut session = started(color);
        let mine = Color::parse(color).unwrap();
        let mut direct = Position::initial();

        for _ in 0..60 {
            let legal = direct.legal_moves();
            if legal.is_empty() { break; }
            let intent = legal[rng.random_range(0..legal.len())].intent();

            if direct.turn() == mine {
                let outcome = local(&mut session, &intent.lan());
                assert!(matches!(outcome, SelectOutcome::Applied(_)), "{} gave {outcome:?}", intent.lan());
                assert_eq!(session.selection(), &Selection::Idle);
                assert_eq!(session.pending_local_move(), None);
            } else {
                remote(&mut session, &intent.lan());
            }
            direct = direct.play(&intent).unwrap().0;

            assert_eq!(session.board().to_fen(), direct.to_fen());
        }

        assert_eq!(session.board().moves(), direct.moves());
        let ledger = session.ledger();
        assert_eq!(ledger, &Ledger::build(direct.moves()));
        assert_eq!(ledger.len(), direct.moves().len());
        let white_plies: Vec<_> = direct.moves().iter().filter(|m| m.color == Color::White).map(|m| m.from).collect();
        assert_eq!(ledger.white.iter().map(|e| e.from).collect::<Vec<_>>(), white_plies);
    }
}
