use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use take6_client::config::{DEFAULT_API_URL, DEFAULT_STATE_DIR, DEFAULT_WS_URL};
use take6_client::store::GameResult;
use take6_client::ws::{self, DriverEvent, UserCommand};
use take6_client::{
    ClientConfig, FileStore, HttpRoomApi, LocalIdentity, LocalViewState, PlayerStatus, ScopeKind,
    Session, Slot, UiEvent,
};
use take6_protocol::{Phase, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cli_client")]
#[command(about = "Take 6 terminal client")]
struct Args {
    /// Room-scope websocket endpoint
    #[arg(long, env = "TAKE6_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,
    /// Game-scope websocket endpoint, defaults to the room endpoint
    #[arg(long, env = "TAKE6_GAME_WS_URL")]
    game_ws_url: Option<String>,
    #[arg(long, env = "TAKE6_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
    #[arg(long, env = "TAKE6_TOKEN")]
    token: Option<String>,
    #[arg(long, env = "TAKE6_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    room: Option<String>,
    /// Attach to a game already in progress
    #[arg(long)]
    game: bool,
}

enum Input {
    Command(UserCommand),
    Help,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    println!("🐮 Take 6 CLI Client");
    println!("====================");

    let name = match args.name {
        Some(name) => name,
        None => prompt("Enter your name: ")?,
    };
    let user_id = match args.user_id {
        Some(id) => id,
        None => prompt("Enter your user id: ")?,
    };
    if name.is_empty() && user_id.is_empty() {
        println!("❌ Need a name or a user id");
        return Ok(());
    }
    let room = match args.room {
        Some(room) => room,
        None => prompt("Room id: ")?,
    };
    if room.is_empty() {
        println!("❌ Room id cannot be empty");
        return Ok(());
    }

    let mut identity = LocalIdentity::default();
    if !user_id.is_empty() {
        identity.id = Some(parse_user_id(&user_id));
    }
    if !name.is_empty() {
        identity = identity.named(name);
    }

    let mut config = ClientConfig::default()
        .with_ws_url(args.ws_url)
        .with_api_base_url(args.api_url)
        .with_token(args.token)
        .with_state_dir(args.state_dir);
    if let Some(url) = args.game_ws_url {
        config = config.with_game_ws_url(url);
    }

    let api = HttpRoomApi::from_config(&config)?;
    let store = FileStore::new(&config.state_dir)?;
    let mut session = Session::new(config, identity, Box::new(store))?;
    let kind = if args.game { ScopeKind::Game } else { ScopeKind::Room };
    println!("🔗 Joining room '{}'...", room);
    session.mount(room, kind, Instant::now());

    let (handle, mut events, driver) = ws::spawn(session, api);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(event);
        }
    });

    print_help();
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => {
                handle.send(UserCommand::Leave);
                break;
            }
        };
        match parse_command(line.trim()) {
            Some(Input::Command(command)) => {
                if !handle.send(command) {
                    println!("🔌 Session stopped");
                    break;
                }
            }
            Some(Input::Help) => print_help(),
            Some(Input::Quit) => {
                handle.send(UserCommand::Leave);
                break;
            }
            None if line.trim().is_empty() => {}
            None => println!("❓ Unknown command: {}", line.trim()),
        }
    }

    drop(handle);
    driver.await?;
    printer.await?;
    println!("👋 Goodbye!");
    Ok(())
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_user_id(raw: &str) -> UserId {
    raw.parse::<i64>().map(UserId::from).unwrap_or_else(|_| UserId::from(raw))
}

fn print_help() {
    println!("\n📋 Commands available:");
    println!("  select <n> - Select a card from your hand");
    println!("  clear      - Clear the selection");
    println!("  play <n>   - Play a card");
    println!("  row <i>    - Take row i when asked to pick one");
    println!("  auto       - Toggle auto-play");
    println!("  ready      - Toggle ready in the lobby");
    println!("  start      - Start the game (host only)");
    println!("  chat <msg> - Send a chat message");
    println!("  refresh    - Ask the server for a fresh snapshot");
    println!("  resume     - Refresh if still connected");
    println!("  reconnect  - Reopen a dropped connection");
    println!("  leave      - Leave the room and quit");
    println!("\nType commands and press Enter:");
}

fn print_event(event: DriverEvent) {
    match event {
        DriverEvent::View(view) => print_view(&view),
        DriverEvent::Rejected(reason) => println!("❌ {reason}"),
        DriverEvent::Ui(event) => match event {
            UiEvent::Notice(e) => println!("⚠️  {e}"),
            UiEvent::Connection(state) => println!("🔗 Connection: {state:?}"),
            UiEvent::EnterGame => println!("🎲 The game has started!"),
            UiEvent::RevealBoard => println!("🃏 Everyone has played, revealing cards"),
            UiEvent::CardsPlaced => println!("📥 Cards placed on the board"),
            UiEvent::RowPromptOpened { timeout } => println!(
                "🚨 Your card fits no row! Take one with `row <i>` within {}s",
                timeout.as_secs()
            ),
            UiEvent::RowPromptClosed => {}
            UiEvent::RowCollected { row_index: Some(i) } => println!("🧹 Row {i} was collected"),
            UiEvent::RowCollected { row_index: None } => println!("🧹 A row was collected"),
            UiEvent::ChatReceived(entry) => {
                let who = if entry.is_me { "you" } else { entry.sender.as_str() };
                println!("💬 {}: {}", who, entry.text);
            }
            UiEvent::TurnCountdownElapsed => println!("⏰ Time is up for this turn"),
            UiEvent::Navigate(result) => print_result(&result),
            UiEvent::Left => println!("🚪 Left the room"),
            UiEvent::ViewUpdated => {}
        },
    }
}

fn print_view(view: &LocalViewState) {
    let Some(phase) = view.phase else {
        return;
    };
    let title = view
        .room_name
        .as_deref()
        .or(view.room_id.as_deref())
        .unwrap_or("?");
    println!("\n🎲 === {title} ===");
    println!("🕹️  Phase: {phase}");

    if phase == Phase::Waiting {
        let lobby = &view.lobby;
        println!("📜 {}", lobby.rules_summary());
        println!("✅ Ready: {}/{}", lobby.ready_count, lobby.player_count);
        for slot in &view.slots {
            match slot {
                Slot::Seat(p) => {
                    let host = if p.is_host { " 👑 HOST" } else { "" };
                    let ready = if p.is_ready { " [READY]" } else { "" };
                    let bot = if p.is_robot { " 🤖" } else { "" };
                    let me = if p.is_me { " 👈 YOU" } else { "" };
                    println!("  {}{}{}{}{}", p.name, bot, host, ready, me);
                }
                Slot::Empty => println!("  (empty seat)"),
            }
        }
        if lobby.can_start_game {
            println!("🚀 Everyone is ready, type `start`");
        }
        let bots = lobby.bot_choices();
        if lobby.is_me_host && !bots.is_empty() {
            println!(
                "🤖 Fill empty seats with `take6 add-bots <room> -c <{}-{}>`",
                bots.start(),
                bots.end()
            );
        }
        println!("==================\n");
        return;
    }

    print!("🎰 Round {} · Turn {}", view.round, view.turn);
    match view.countdown_secs {
        Some(secs) => println!(" · ⏳ {secs}s"),
        None => println!(),
    }

    println!("🧱 Board:");
    for (i, row) in view.board.iter().enumerate() {
        let cards: Vec<String> = row.cards.iter().map(ToString::to_string).collect();
        let danger = if row.is_danger { " 🔥" } else { "" };
        println!("  Row {}: {} [{}🐮]{}", i, cards.join(" "), row.penalty, danger);
    }
    if !view.revealed.is_empty() && view.all_committed {
        let cards: Vec<String> = view.revealed.iter().map(ToString::to_string).collect();
        println!("🃏 Revealed: {}", cards.join(" "));
    }

    println!("👥 Players ({}):", view.players.len());
    for p in &view.players {
        let status = match p.status {
            PlayerStatus::Played => " [PLAYED]",
            PlayerStatus::Locked => " [SELECTED]",
            PlayerStatus::Thinking => " [THINKING]",
        };
        let auto = if p.is_auto_play { " 🤖 AUTO" } else { "" };
        let me = if p.is_me { " 👈 YOU" } else { "" };
        println!("  {}: {} 🐮{}{}{}", p.name, p.score, status, auto, me);
    }

    let hand: Vec<String> = view
        .hand
        .iter()
        .map(|c| {
            if view.selected_card == Some(c.number) {
                format!("[{c}]")
            } else {
                c.to_string()
            }
        })
        .collect();
    println!("🂠 Your hand: {}", hand.join(" "));
    if view.is_auto_play {
        println!("🤖 Auto-play is on");
    } else if view.is_processing_action {
        println!("⌛ Waiting for the server...");
    } else if view.can_act {
        println!("👉 Your move: `play <n>`");
    }
    println!("==================\n");
}

fn print_result(result: &GameResult) {
    if result.is_game_over {
        println!("\n🏁 GAME OVER!");
    } else {
        println!(
            "\n📊 Round {} finished, {} to go",
            result.current_round, result.remaining_rounds
        );
    }
    for s in &result.standings {
        let me = if s.is_me { " 👈 YOU" } else { "" };
        println!("  {}. {} with {} 🐮{}", s.rank, s.name, s.score, me);
    }
    if let (true, Some(winner)) = (result.is_game_over, result.winner()) {
        println!("🏆 Winner: {}", winner.name);
    }
}

fn parse_command(input: &str) -> Option<Input> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    let number = || parts.get(1).and_then(|n| n.parse::<u32>().ok());
    let command = match parts[0].to_lowercase().as_str() {
        "select" => UserCommand::Select(number()?),
        "clear" => UserCommand::ClearSelection,
        "play" => UserCommand::Play(number()?),
        "row" => UserCommand::SelectRow(parts.get(1)?.parse().ok()?),
        "auto" => UserCommand::ToggleAutoPlay,
        "ready" => UserCommand::ToggleReady,
        "start" => UserCommand::StartGame,
        "chat" => {
            if parts.len() > 1 {
                UserCommand::Chat(parts[1..].join(" "))
            } else {
                println!("❌ Chat message cannot be empty");
                return None;
            }
        }
        "refresh" => UserCommand::Refresh,
        "resume" => UserCommand::Resume,
        "reconnect" => UserCommand::Reconnect,
        "help" => return Some(Input::Help),
        "leave" | "quit" => return Some(Input::Quit),
        _ => return None,
    };
    Some(Input::Command(command))
}
