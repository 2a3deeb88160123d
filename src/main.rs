//! Control-room binary: a host console driving the shared game night state.
//!
//! Every invocation is one context. Run it twice against the same data
//! directory and both consoles stay in sync through the shared document.

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crystal_owl::config::AppConfig;
use crystal_owl::context::{Context, SharedContext};
use crystal_owl::services::{roster_service, timer_service, wheel_service};
use crystal_owl::state::{GameState, Player};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let context = Context::open(config)
        .await
        .context("opening control-room context")?;
    info!(context = %context.id(), "host console ready");
    println!("crystal-owl host console. Type `help` for commands.");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                match line.context("reading console input")? {
                    Some(line) => {
                        if run_command(&context, line.trim()).await == Flow::Quit {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    context.close();
    Ok(())
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Dispatch one console line against the context.
async fn run_command(context: &SharedContext, line: &str) -> Flow {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Flow::Continue;
    };
    let rest: Vec<&str> = words.collect();

    match command {
        "help" => print_help(),
        "state" => match serde_json::to_string_pretty(&context.hub().current()) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("error: {err}"),
        },
        "players" => print_players(&context.hub().current()),
        "add" => add_player(context, &rest).await,
        "photo" => add_photo(context, &rest).await,
        "remove" => remove_player(context, &rest).await,
        "spin" => match wheel_service::spin(context) {
            Ok(outcome) => println!(
                "the wheel lands on {} ({}) at {:.1} degrees",
                outcome.player.name, outcome.player.city, outcome.plan.target_angle
            ),
            Err(err) => println!("error: {err}"),
        },
        "clear" => report(wheel_service::clear_selection(context).map(|_| "selection cleared")),
        "timer" => {
            let total = rest
                .first()
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(|| context.config().round_seconds());
            report(timer_service::start(context, total).map(|()| "countdown running"));
        }
        "stop" => report(timer_service::stop(context).map(|()| "countdown stopped")),
        "scores" => set_scores(context, &rest),
        "reset" => report(roster_service::reset_game(context).await.map(|_| "game reset")),
        "quit" | "exit" => return Flow::Quit,
        other => println!("unknown command `{other}`; type `help`"),
    }
    Flow::Continue
}

fn print_help() {
    println!(
        "commands:\n  \
         state                     print the shared document\n  \
         players                   list the roster\n  \
         add <name> <city> <n>     register a player with n questions\n  \
         photo <player> <path>     attach a photo file to a player\n  \
         remove <player>           delete a player and their photos\n  \
         spin                      spin the wheel\n  \
         clear                     dismiss the current selection\n  \
         timer [seconds]           start the countdown\n  \
         stop                      stop the countdown\n  \
         scores <team> <viewers>   set both score counters\n  \
         reset                     wipe the whole game\n  \
         quit                      leave the console"
    );
}

fn print_players(state: &GameState) {
    if state.players.is_empty() {
        println!("no players registered");
        return;
    }
    for player in &state.players {
        let marker = if state.current_player_id == Some(player.id) {
            " <- selected"
        } else {
            ""
        };
        println!(
            "  {} ({}) questions={} photos={}{marker}",
            player.name,
            player.city,
            player.question_count,
            player.photo_ids.len()
        );
    }
}

async fn add_player(context: &SharedContext, args: &[&str]) {
    let (Some(name), Some(city)) = (args.first(), args.get(1)) else {
        println!("usage: add <name> <city> <questions>");
        return;
    };
    let question_count = args.get(2).and_then(|value| value.parse().ok()).unwrap_or(3);

    let new_player = roster_service::NewPlayer {
        name: (*name).to_owned(),
        city: (*city).to_owned(),
        question_count,
    };
    match roster_service::add_player(context, new_player, Vec::new()).await {
        Ok(player) => println!("registered {} ({})", player.name, player.id),
        Err(err) => println!("error: {err}"),
    }
}

async fn add_photo(context: &SharedContext, args: &[&str]) {
    let (Some(needle), Some(path)) = (args.first(), args.get(1)) else {
        println!("usage: photo <player> <path>");
        return;
    };
    let Some(player) = resolve_player(&context.hub().current(), needle) else {
        println!("no player matching `{needle}`");
        return;
    };

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes.into(),
        Err(err) => {
            println!("error reading {path}: {err}");
            return;
        }
    };
    match roster_service::add_photos(context, player.id, vec![bytes]).await {
        Ok(ids) => {
            for id in ids {
                println!("stored photo {} for {}", id, player.name);
            }
        }
        Err(err) => println!("error: {err}"),
    }
}

async fn remove_player(context: &SharedContext, args: &[&str]) {
    let Some(needle) = args.first() else {
        println!("usage: remove <player>");
        return;
    };
    let Some(player) = resolve_player(&context.hub().current(), needle) else {
        println!("no player matching `{needle}`");
        return;
    };
    match roster_service::delete_player(context, player.id).await {
        Ok(_) => println!("removed {}", player.name),
        Err(err) => println!("error: {err}"),
    }
}

fn set_scores(context: &SharedContext, args: &[&str]) {
    let (Some(team), Some(viewers)) = (
        args.first().and_then(|value| value.parse().ok()),
        args.get(1).and_then(|value| value.parse().ok()),
    ) else {
        println!("usage: scores <team> <viewers>");
        return;
    };
    match context.hub().set_scores(team, viewers) {
        Ok(state) => println!(
            "scores: team {} / viewers {}",
            state.knowledge_score, state.viewer_score
        ),
        Err(err) => println!("error: {err}"),
    }
}

/// Find a player by name (case-insensitive) or id prefix.
fn resolve_player(state: &GameState, needle: &str) -> Option<Player> {
    let lowered = needle.to_lowercase();
    state
        .players
        .iter()
        .find(|p| p.name.to_lowercase() == lowered || p.id.to_string().starts_with(&lowered))
        .cloned()
}

fn report(outcome: Result<&str, impl std::fmt::Display>) {
    match outcome {
        Ok(message) => println!("{message}"),
        Err(err) => println!("error: {err}"),
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the console down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut term) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
