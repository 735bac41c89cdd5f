use std::future::{pending, Future};
use std::pin::Pin;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use take6_protocol::RoomSnapshot;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, handshake::client::Response, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{ApiError, GateRejection};
use crate::reconcile::LocalViewState;
use crate::rest::HttpRoomApi;
use crate::session::{Effect, Session, UiEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingConnect =
    Pin<Box<dyn Future<Output = Result<(Socket, Response), tungstenite::Error>> + Send>>;

/// What a front-end can ask the running session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Select(u32),
    ClearSelection,
    Play(u32),
    SelectRow(usize),
    ToggleAutoPlay,
    ToggleReady,
    StartGame,
    Chat(String),
    Refresh,
    Resume,
    Reconnect,
    Leave,
}

#[derive(Debug)]
pub enum DriverEvent {
    Ui(UiEvent),
    /// Fresh copy of the view after every update.
    View(Box<LocalViewState>),
    Rejected(GateRejection),
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<UserCommand>,
}

impl SessionHandle {
    /// False once the driver has stopped.
    pub fn send(&self, command: UserCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Runs an already-mounted session on its own task.
pub fn spawn(
    session: Session,
    api: HttpRoomApi,
) -> (SessionHandle, mpsc::UnboundedReceiver<DriverEvent>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, api, cmd_rx, event_tx));
    (SessionHandle { commands: cmd_tx }, event_rx, task)
}

/// Single-task event loop: socket frames, user commands, fetch results and
/// the session's nearest timer deadline are all serialized here. Returns
/// after the user leaves or the command channel closes.
pub async fn run(
    mut session: Session,
    api: HttpRoomApi,
    mut commands: mpsc::UnboundedReceiver<UserCommand>,
    events: mpsc::UnboundedSender<DriverEvent>,
) {
    let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<Result<RoomSnapshot, ApiError>>();
    let mut socket: Option<Socket> = None;
    let mut connecting: Option<PendingConnect> = None;

    loop {
        let left = execute(&mut session, &mut socket, &mut connecting, &api, &fetch_tx, &events).await;
        if left {
            break;
        }

        let deadline = session.next_deadline();
        tokio::select! {
            result = next_connect(&mut connecting) => {
                connecting = None;
                match result {
                    Ok((stream, _)) => {
                        socket = Some(stream);
                        session.on_open(Instant::now());
                    }
                    Err(e) => session.on_error(format!("connect: {e}"), Instant::now()),
                }
            }
            frame = next_frame(&mut socket) => match frame {
                Some(Ok(Message::Text(text))) => session.on_frame(&text, Instant::now()),
                Some(Ok(Message::Close(_))) | None => {
                    socket = None;
                    session.on_closed(Instant::now());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    socket = None;
                    session.on_error(e.to_string(), Instant::now());
                }
            },
            command = commands.recv() => match command {
                Some(command) => {
                    if let Err(reason) = apply(&mut session, command) {
                        let _ = events.send(DriverEvent::Rejected(reason));
                    }
                }
                None => {
                    session.teardown();
                    execute(&mut session, &mut socket, &mut connecting, &api, &fetch_tx, &events).await;
                    break;
                }
            },
            Some(result) = fetch_rx.recv() => session.on_fetched(result, Instant::now()),
            _ = sleep_until(deadline) => session.advance(Instant::now()),
        }
    }
    debug!("session driver stopped");
}

fn apply(session: &mut Session, command: UserCommand) -> Result<(), GateRejection> {
    let now = Instant::now();
    match command {
        UserCommand::Select(card) => session.select_card(card)?,
        UserCommand::ClearSelection => session.clear_selection(),
        UserCommand::Play(card) => session.attempt_play(card, now)?,
        UserCommand::SelectRow(row) => session.attempt_select_row(row, now)?,
        UserCommand::ToggleAutoPlay => {
            session.toggle_auto_play(now)?;
        }
        UserCommand::ToggleReady => {
            session.toggle_ready()?;
        }
        UserCommand::StartGame => session.start_game()?,
        UserCommand::Chat(text) => session.send_chat(&text)?,
        UserCommand::Refresh => {
            session.refresh(now);
        }
        UserCommand::Resume => session.resume(now),
        UserCommand::Reconnect => {
            session.reconnect(now);
        }
        UserCommand::Leave => session.leave(),
    }
    Ok(())
}

/// Drains and performs the session's effects until none are left. Closing
/// the socket is acknowledged straight back to the session, which may queue
/// the next open. Returns true once the session reports the user left.
async fn execute(
    session: &mut Session,
    socket: &mut Option<Socket>,
    connecting: &mut Option<PendingConnect>,
    api: &HttpRoomApi,
    fetch_tx: &mpsc::UnboundedSender<Result<RoomSnapshot, ApiError>>,
    events: &mpsc::UnboundedSender<DriverEvent>,
) -> bool {
    let mut left = false;
    loop {
        let effects = session.take_effects();
        if effects.is_empty() {
            return left;
        }
        for effect in effects {
            match effect {
                Effect::Open { url } => {
                    debug!(%url, "opening socket");
                    *socket = None;
                    *connecting = Some(Box::pin(connect_async(url)));
                }
                Effect::Close => {
                    *connecting = None;
                    if let Some(mut stream) = socket.take() {
                        if let Err(e) = stream.close(None).await {
                            debug!(error = %e, "close handshake failed");
                        }
                    }
                    session.on_closed(Instant::now());
                }
                Effect::Send(text) => match socket.as_mut() {
                    Some(stream) => {
                        if let Err(e) = stream.send(Message::Text(text)).await {
                            warn!(error = %e, "send failed");
                        }
                    }
                    None => warn!("no socket, dropping outbound frame"),
                },
                Effect::FetchSnapshot { room_id } => {
                    let api = api.clone();
                    let tx = fetch_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(api.fetch_state(&room_id).await);
                    });
                }
                Effect::LeaveRoom { room_id } => {
                    if let Err(e) = api.leave_room(&room_id).await {
                        warn!(%room_id, error = %e, "leave over REST failed");
                    }
                }
                Effect::Ui(UiEvent::ViewUpdated) => {
                    let _ = events.send(DriverEvent::View(Box::new(session.view().clone())));
                }
                Effect::Ui(event) => {
                    left |= matches!(event, UiEvent::Left);
                    let _ = events.send(DriverEvent::Ui(event));
                }
            }
        }
    }
}

async fn next_connect(
    connecting: &mut Option<PendingConnect>,
) -> Result<(Socket, Response), tungstenite::Error> {
    match connecting.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<Message, tungstenite::Error>> {
    match socket.as_mut() {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => pending().await,
    }
}
