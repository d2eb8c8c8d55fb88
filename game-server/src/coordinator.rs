//! The per connection handler. It bridges request decoding, session mutation and broadcast.
//!
//! Every accepted connection gets:
//! - a **writer task** that drains the outbound channel registered in the
//!   [`ConnectionRegistry`](crate::registry::ConnectionRegistry) into the socket
//! - a **read loop** (the connection task itself) that decodes one request per line and hands it to
//!   its [`SessionCoordinator`]
//!
//! # Connection state machine
//!
//! ```text
//! [Unjoined]    --Name Submitted / play again--> [Joined(slot)]
//! [Joined]      --move---------------------------> [Joined]      (MoveAccepted / MoveRejected)
//! [Joined]      --winning or drawing move--------> [SessionOver] (round ended for everybody)
//! [SessionOver] --play again---------------------> [Joined(slot)]
//! [any]         --Player Exits (honored)---------> [Unjoined]    (PlayerExited broadcast)
//! [any]         --Player wants to exit-----------> [Closed]
//! [Unjoined]    --join while full----------------> [Closed]      (Players are full)
//! ```
//!
//! Each request takes the session lock once, acquires the dispatch permit, releases the session
//! lock and only then delivers, so one request yields at most one broadcast group and groups reach
//! all clients in the order of the mutations.

use crate::ConnectionId;
use crate::server_state::ServerState;
use crate::session::{ExitOutcome, GameSession, MoveOutcome, SlotAssignment};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use protocol::{MAX_LINE_LENGTH, PlayerSlot, Request, Response};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, Receiver};
use tokio_util::codec::{BytesCodec, Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

/// Where one connection stands in the join / play / replay cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    Unjoined,
    /// Seated in the round with the given generation.
    Joined { slot: PlayerSlot, round: u64 },
    /// The round this connection played in is over, a replay answer is expected.
    SessionOver,
    Closed,
}

/// Whether the read loop goes on after a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(&'static str),
}

/// Applies the requests of one connection to the shared session.
pub struct SessionCoordinator {
    connection: ConnectionId,
    state: Arc<ServerState>,
    phase: ConnectionPhase,
}

impl SessionCoordinator {
    pub fn new(connection: ConnectionId, state: Arc<ServerState>) -> SessionCoordinator {
        SessionCoordinator {
            connection,
            state,
            phase: ConnectionPhase::Unjoined,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Processes one decoded request.
    pub async fn handle(&mut self, request: Request) -> Flow {
        match request {
            Request::NameSubmitted | Request::PlayAgain => self.join().await,
            Request::MovePressed { slot, row, col } => {
                self.press(slot, row, col).await;
                Flow::Continue
            }
            Request::Exit => {
                self.exit().await;
                Flow::Continue
            }
            Request::Leave => self.leave().await,
        }
    }

    /// A round that ended on another connection shows up as a newer generation.
    fn observe(phase: &mut ConnectionPhase, session: &GameSession) {
        if let ConnectionPhase::Joined { round, .. } = *phase {
            if session.round() != round {
                *phase = ConnectionPhase::SessionOver;
            }
        }
    }

    async fn join(&mut self) -> Flow {
        let mut session = self.state.session.lock().await;
        Self::observe(&mut self.phase, &session);
        let assignment = session.try_join(self.connection);
        let round = session.round();
        let dispatch = self.state.registry.dispatch().await;
        drop(session);

        match assignment {
            SlotAssignment::Joined { slot, session_full } => {
                self.phase = ConnectionPhase::Joined { slot, round };
                tracing::info!(connection = %self.connection, %slot, session_full, "Player joined.");
                let response = Response::SlotJoined(slot);
                if session_full {
                    dispatch.broadcast(&response).await;
                } else {
                    dispatch.send_to(self.connection, &response).await;
                }
                Flow::Continue
            }
            SlotAssignment::AlreadySeated(slot) => {
                self.phase = ConnectionPhase::Joined { slot, round };
                dispatch
                    .send_to(self.connection, &Response::SlotJoined(slot))
                    .await;
                Flow::Continue
            }
            SlotAssignment::SlotsFull => {
                self.phase = ConnectionPhase::Closed;
                tracing::info!(connection = %self.connection, "Join rejected, players are full.");
                dispatch.send_to(self.connection, &Response::SlotsFull).await;
                Flow::Close("Players are full.")
            }
        }
    }

    async fn press(&mut self, slot: PlayerSlot, row: i32, col: i32) {
        let mut session = self.state.session.lock().await;
        Self::observe(&mut self.phase, &session);
        let outcome = session.play(self.connection, slot, row, col);
        let dispatch = self.state.registry.dispatch().await;
        drop(session);

        let accepted = Response::MoveAccepted { slot, row, col };
        match outcome {
            MoveOutcome::Accepted => {
                dispatch.broadcast(&accepted).await;
            }
            MoveOutcome::AcceptedAndWon | MoveOutcome::AcceptedAndDrawn => {
                let result = if outcome == MoveOutcome::AcceptedAndWon {
                    Response::Win(slot)
                } else {
                    Response::Draw
                };
                tracing::info!(connection = %self.connection, %result, "Round over.");
                dispatch.broadcast(&accepted).await;
                dispatch.broadcast(&result).await;
                if matches!(self.phase, ConnectionPhase::Joined { .. }) {
                    self.phase = ConnectionPhase::SessionOver;
                }
            }
            MoveOutcome::Rejected(reason) => {
                tracing::debug!(connection = %self.connection, %slot, row, col, ?reason, "Move rejected.");
                dispatch
                    .send_to(self.connection, &Response::MoveRejected(slot))
                    .await;
            }
        }
    }

    async fn exit(&mut self) {
        let mut session = self.state.session.lock().await;
        Self::observe(&mut self.phase, &session);
        let outcome = session.exit(self.connection);
        let dispatch = self.state.registry.dispatch().await;
        drop(session);

        match outcome {
            ExitOutcome::Honored => {
                tracing::info!(connection = %self.connection, "Player exits, session reset.");
                self.phase = ConnectionPhase::Unjoined;
                dispatch.broadcast(&Response::PlayerExited).await;
            }
            ExitOutcome::Ignored => {
                tracing::info!(
                    connection = %self.connection,
                    "Exit ignored, connection is not part of the open lobby."
                );
            }
        }
    }

    async fn leave(&mut self) -> Flow {
        let released = self.state.session.lock().await.release(self.connection);
        if let Some(slot) = released {
            tracing::info!(connection = %self.connection, %slot, "Slot released on leave.");
        }
        self.phase = ConnectionPhase::Closed;
        Flow::Close("Player declined to play again.")
    }
}

/// Serves one accepted connection from start to finish: register -> read loop -> clean up.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    let connection = state.next_connection_id();
    tracing::info!(%connection, %peer, "Connected.");

    let (read_half, write_half) = stream.into_split();
    let (sender, receiver) = mpsc::channel(state.config.outbound_buffer);
    state.registry.add(connection, sender).await;
    let mut writer = tokio::spawn(send_logic(write_half, receiver, connection));

    let mut coordinator = SessionCoordinator::new(connection, state.clone());
    let reason = receive_logic(read_half, &mut coordinator, &shutdown).await;

    // The registry holds the only sender, removing it lets the writer drain and close.
    state.registry.remove(connection).await;
    if let Some(slot) = state.session.lock().await.release(connection) {
        tracing::info!(%connection, %slot, "Slot released on disconnect.");
    }

    match tokio::time::timeout(state.config.shutdown_grace(), &mut writer).await {
        Ok(Ok(end)) => tracing::debug!(%connection, end, "Writer finished."),
        Ok(Err(error)) => tracing::error!(%connection, ?error, "Writer task failed."),
        Err(_) => {
            tracing::warn!(%connection, "Writer did not finish in time.");
            writer.abort();
        }
    }
    tracing::info!(%connection, reason, "Connection closed.");
}

/// Reads request lines until the connection ends and returns why it ended.
async fn receive_logic(
    read_half: OwnedReadHalf,
    coordinator: &mut SessionCoordinator,
    shutdown: &CancellationToken,
) -> &'static str {
    let connection = coordinator.connection;
    let read_timeout = coordinator.state.config.read_timeout();
    let mut lines = FramedRead::new(read_half, RequestLines::new());

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return "Server shutting down.",
            next = tokio::time::timeout(read_timeout, lines.next()) => next,
        };
        let line = match next {
            Err(_) => return "Read timeout.",
            Ok(None) => return "Connection closed by client.",
            Ok(Some(Err(error))) => {
                tracing::debug!(%connection, ?error, "Read failed.");
                return "Connection lost.";
            }
            Ok(Some(Ok(Err(fault)))) => {
                tracing::warn!(%connection, ?fault, "Unreadable line ignored.");
                continue;
            }
            Ok(Some(Ok(Ok(line)))) => line,
        };

        if !coordinator.state.registry.contains(connection).await {
            return "Dropped after failed delivery.";
        }

        tracing::debug!(%connection, line = %line, "Received.");
        match Request::decode(&line) {
            Ok(request) => {
                if let Flow::Close(reason) = coordinator.handle(request).await {
                    return reason;
                }
            }
            Err(error) => tracing::warn!(%connection, %error, "Malformed line ignored."),
        }
    }
}

/// Drains the outbound channel into the socket. Ends when the registry drops the sender or the
/// socket fails.
async fn send_logic(
    write_half: OwnedWriteHalf,
    mut receiver: Receiver<Bytes>,
    connection: ConnectionId,
) -> &'static str {
    let mut sink = FramedWrite::new(write_half, BytesCodec::new());

    while let Some(line) = receiver.recv().await {
        if let Err(error) = sink.send(line).await {
            tracing::warn!(%connection, ?error, "Error in communication with client endpoint.");
            return "Error in communication with client endpoint.";
        }
    }
    // Shuts the write half down, the client sees end of stream.
    if let Err(error) = SinkExt::<Bytes>::close(&mut sink).await {
        tracing::debug!(%connection, ?error, "Closing the write half failed.");
    }
    "Outbound channel closed."
}

/// A line that cannot be decoded at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFault {
    TooLong,
    NotUtf8,
}

/// Newline framing that hands bad lines up as items. `FramedRead` ends the stream after a decoder
/// error, a bad line must only cost that line.
struct RequestLines {
    inner: LinesCodec,
}

impl RequestLines {
    fn new() -> RequestLines {
        RequestLines {
            inner: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }

    fn tolerate(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Result<String, LineFault>>, std::io::Error> {
        match result {
            Ok(line) => Ok(line.map(Ok)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Err(LineFault::TooLong))),
            Err(LinesCodecError::Io(error)) if error.kind() == ErrorKind::InvalidData => {
                Ok(Some(Err(LineFault::NotUtf8)))
            }
            Err(LinesCodecError::Io(error)) => Err(error),
        }
    }
}

impl Decoder for RequestLines {
    type Item = Result<String, LineFault>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::tolerate(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::tolerate(self.inner.decode_eof(src))
    }
}
