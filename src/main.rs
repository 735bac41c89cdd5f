use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use take6_client::config::{DEFAULT_API_URL, DEFAULT_MAX_PLAYERS, DEFAULT_STATE_DIR};
use take6_client::lobby::DEFAULT_TARGET_SCORE;
use take6_client::reconcile::reconcile;
use take6_client::{
    ClientConfig, CreateRoom, FileStore, HttpRoomApi, LocalIdentity, LocalViewState,
    SessionStore, Slot,
};
use take6_protocol::{decode_server_message, RoomSnapshot, ServerToClient, UserId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "take6")]
#[command(about = "Take 6 - room management and snapshot tools")]
struct Cli {
    #[arg(long, global = true, env = "TAKE6_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
    #[arg(long, global = true, env = "TAKE6_TOKEN")]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a room and print its id
    Create {
        #[arg(long, default_value = "Take 6")]
        name: String,
        #[arg(long, default_value = "4")]
        max_players: usize,
        /// Makes the room private
        #[arg(long)]
        password: Option<String>,
        /// End the game once someone reaches this many penalty points
        #[arg(long, conflicts_with = "max_rounds")]
        target_score: Option<i64>,
        /// End the game after a fixed number of rounds
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Join a room over REST
    Join {
        room: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Leave a room over REST
    Leave { room: String },
    /// Set the ready flag
    Ready {
        room: String,
        #[arg(long, default_value = "true", action = ArgAction::Set)]
        ready: bool,
    },
    /// Start the game (host only)
    Start { room: String },
    /// Fill empty seats with bots
    AddBots {
        room: String,
        #[arg(short, long, default_value = "1")]
        count: usize,
    },
    /// Fetch the current room snapshot and show it from a player's seat
    State {
        room: String,
        #[arg(long)]
        user_id: Option<String>,
        /// Print the raw snapshot instead
        #[arg(long)]
        json: bool,
    },
    /// Show a saved snapshot or state frame offline
    Inspect {
        path: PathBuf,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Print the last saved round or game result
    Results {
        #[arg(long, env = "TAKE6_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
        state_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::default()
        .with_api_base_url(cli.api_url)
        .with_token(cli.token);

    match cli.command {
        Commands::Create { name, max_players, password, target_score, max_rounds } => {
            let api = HttpRoomApi::from_config(&config)?;
            let room = CreateRoom {
                room_name: name,
                max_players,
                is_private: password.is_some(),
                password: password.unwrap_or_default(),
                target_score: match max_rounds {
                    Some(_) => None,
                    None => Some(target_score.unwrap_or(DEFAULT_TARGET_SCORE)),
                },
                max_rounds,
            };
            let room_id = api.create_room(&room).await?;
            info!(%room_id, "room created");
            println!("{room_id}");
        }
        Commands::Join { room, password } => {
            let api = HttpRoomApi::from_config(&config)?;
            api.join_room(&room, password.as_deref()).await?;
            println!("✅ Joined {room}");
        }
        Commands::Leave { room } => {
            let api = HttpRoomApi::from_config(&config)?;
            api.leave_room(&room).await?;
            println!("🚪 Left {room}");
        }
        Commands::Ready { room, ready } => {
            let api = HttpRoomApi::from_config(&config)?;
            api.set_ready(&room, ready).await?;
            println!("✅ Ready: {ready}");
        }
        Commands::Start { room } => {
            let api = HttpRoomApi::from_config(&config)?;
            api.start_game(&room).await?;
            println!("🚀 Game starting in {room}");
        }
        Commands::AddBots { room, count } => {
            let api = HttpRoomApi::from_config(&config)?;
            api.add_bots(&room, count).await?;
            println!("🤖 Added {count} bot(s) to {room}");
        }
        Commands::State { room, user_id, json } => {
            let api = HttpRoomApi::from_config(&config)?;
            let snapshot = api.fetch_state(&room).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                show(&snapshot, user_id.as_deref());
            }
        }
        Commands::Inspect { path, user_id } => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let snapshot = load_snapshot(&text)?;
            show(&snapshot, user_id.as_deref());
        }
        Commands::Results { state_dir } => {
            let store = FileStore::new(state_dir)?;
            match store.load_result()? {
                Some(result) => {
                    let title = result.room_name.as_deref().unwrap_or(&result.room_id);
                    let status = if result.is_game_over { "game over" } else { "round over" };
                    println!("{title} ({status}, round {}/{})", result.current_round, result.max_rounds);
                    for s in &result.standings {
                        println!("  {}. {:<16} {:>4}", s.rank, s.name, s.score);
                    }
                }
                None => println!("No saved result"),
            }
        }
    }
    Ok(())
}

/// Accepts a bare snapshot or a whole `gameStateUpdate` frame.
fn load_snapshot(text: &str) -> anyhow::Result<RoomSnapshot> {
    if let Ok(ServerToClient::StateUpdate(snapshot)) = decode_server_message(text) {
        return Ok(*snapshot);
    }
    serde_json::from_str(text).context("not a room snapshot")
}

fn identity(user_id: Option<&str>) -> LocalIdentity {
    match user_id {
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) => LocalIdentity::with_id(n),
            Err(_) => LocalIdentity::with_id(UserId::from(raw)),
        },
        None => LocalIdentity::default(),
    }
}

fn show(snapshot: &RoomSnapshot, user_id: Option<&str>) {
    let me = identity(user_id);
    let view = reconcile(&LocalViewState::default(), snapshot, &me, DEFAULT_MAX_PLAYERS).view;
    let room = view.room_id.as_deref().unwrap_or("?");
    let phase = view.phase.map(|p| p.to_string()).unwrap_or_default();
    println!("Room {room} · {phase} · round {} turn {}", view.round, view.turn);
    if let Some(secs) = view.countdown_secs {
        println!("Countdown: {secs}s");
    }
    for (i, row) in view.board.iter().enumerate() {
        let cards: Vec<String> = row.cards.iter().map(|c| c.number.to_string()).collect();
        println!("  row {i}: {:<20} {:>3} pts", cards.join(" "), row.penalty);
    }
    for slot in &view.slots {
        match slot {
            Slot::Seat(p) => {
                let mut flags = Vec::new();
                if p.is_host {
                    flags.push("host");
                }
                if p.is_ready {
                    flags.push("ready");
                }
                if p.is_robot {
                    flags.push("bot");
                }
                if p.is_auto_play {
                    flags.push("auto");
                }
                if p.is_me {
                    flags.push("me");
                }
                println!("  {:<16} {:>4} {:?} {}", p.name, p.score, p.status, flags.join(","));
            }
            Slot::Empty => println!("  (open seat)"),
        }
    }
    if view.me_index.is_some() {
        let hand: Vec<String> = view.hand.iter().map(|c| c.number.to_string()).collect();
        println!("Hand: {}", hand.join(" "));
        println!("Can act: {}", view.can_act);
    } else if user_id.is_some() {
        println!("User is not seated in this room");
    }
}
