use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};
use whack::{
    app::App,
    app_dirs::AppDirs,
    config::parse_volume,
    logging,
    runtime::{CrosstermEventSource, GameEvent, Runner},
    DifficultyModel, Phase, SessionConfig, SessionState,
};

const REDRAW_MS: u64 = 50;

/// timed whack-a-mole for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Hit the target before it disappears. Consecutive hits build a combo, every five hits raise the level and speed things up. Scores and player stats are kept between sessions."
)]
pub struct Cli {
    /// directory for the score database, settings and log
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// log level (overridden by RUST_LOG)
    #[clap(long, global = true)]
    log_level: Option<String>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// play a session (default)
    Play {
        /// starting level, must be unlocked (defaults to the saved starting level)
        #[clap(short = 'l', long)]
        level: Option<u32>,

        /// session length in seconds
        #[clap(short = 's', long, default_value_t = 30)]
        secs: u32,

        /// play as this player (saved as the configured player)
        #[clap(short = 'p', long)]
        player: Option<String>,
    },
    /// show the high score table
    Scores {
        #[clap(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// show lifetime stats for a player
    Stats {
        /// player name (defaults to the configured player)
        #[clap(short = 'p', long)]
        player: Option<String>,
    },
    /// list the starting levels the current player has unlocked
    Levels,
    /// delete all scores and player stats
    Clear {
        /// skip the confirmation guard
        #[clap(long)]
        yes: bool,
    },
    /// show or change settings
    Config {
        #[clap(long)]
        name: Option<String>,

        #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
        level: Option<u32>,

        #[clap(long, value_parser = volume_arg)]
        music: Option<f32>,

        #[clap(long, value_parser = volume_arg)]
        sfx: Option<f32>,

        #[clap(long)]
        vibration: Option<bool>,
    },
}

fn volume_arg(raw: &str) -> Result<f32, String> {
    parse_volume(raw).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let dirs = cli
        .data_dir
        .as_ref()
        .map(AppDirs::rooted_at)
        .unwrap_or_else(AppDirs::discover);
    logging::init_tracing(&dirs.log_path(), cli.log_level.as_deref());

    let command = cli.command.clone().unwrap_or(Command::Play {
        level: None,
        secs: 30,
        player: None,
    });

    let session_config = match &command {
        Command::Play { secs, .. } => SessionConfig {
            duration_ticks: *secs,
            ..SessionConfig::default()
        },
        _ => SessionConfig::default(),
    };
    let app = App::open(dirs, session_config, DifficultyModel::default())?;

    let result = run_command(&app, command);
    app.shutdown();
    result
}

fn run_command(app: &App, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Play { level, player, .. } => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            if let Some(player) = player {
                app.settings.update(|s| s.player_name = player);
            }
            play(app, level)
        }
        Command::Scores { count } => {
            let scores = app.store.query_top_scores(count)?;
            if scores.is_empty() {
                println!("No scores yet");
            }
            for (rank, record) in scores.iter().enumerate() {
                println!(
                    "{:>3}. {:<16} {:>7}  {:<7} {:>4} hits {:>4} misses  {}",
                    rank + 1,
                    record.player_name,
                    record.score,
                    record.difficulty,
                    record.hits,
                    record.misses,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                );
            }
            Ok(())
        }
        Command::Stats { player } => {
            let player = player.unwrap_or_else(|| app.player_name());
            match app.store.player_aggregate(&player)? {
                Some(agg) => {
                    println!("player:       {}", agg.player_name);
                    println!("games played: {}", agg.games_played);
                    println!("hits:         {}", agg.total_hits);
                    println!("misses:       {}", agg.total_misses);
                    if let Some(accuracy) = agg.accuracy() {
                        println!("accuracy:     {accuracy:.1}%");
                    }
                    println!("best score:   {}", agg.best_score);
                }
                None => println!("No games recorded for {player}"),
            }
            Ok(())
        }
        Command::Levels => {
            let unlocked = app.unlocked_levels();
            let levels: Vec<String> = unlocked.levels().iter().map(u32::to_string).collect();
            println!("{}", levels.join(" "));
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::MissingRequiredArgument,
                    "refusing to delete all data without --yes",
                )
                .exit();
            }
            app.clear_data()?;
            println!("All scores and player stats deleted");
            Ok(())
        }
        Command::Config {
            name,
            level,
            music,
            sfx,
            vibration,
        } => {
            let changed = name.is_some()
                || level.is_some()
                || music.is_some()
                || sfx.is_some()
                || vibration.is_some();
            let settings = if changed {
                app.settings.update(|s| {
                    if let Some(name) = name {
                        s.player_name = name;
                    }
                    if let Some(level) = level {
                        s.starting_level = level;
                    }
                    if let Some(music) = music {
                        s.music_volume = music;
                    }
                    if let Some(sfx) = sfx {
                        s.sfx_volume = sfx;
                    }
                    if let Some(vibration) = vibration {
                        s.vibration_enabled = vibration;
                    }
                })
            } else {
                app.settings.current()
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn play(app: &App, level: Option<u32>) -> Result<(), Box<dyn Error>> {
    let level = level.unwrap_or_else(|| app.settings.current().starting_level);
    app.controller.start_session(level, &app.unlocked_levels())?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;

    let result = play_loop(app, level, &mut stdout);

    disable_raw_mode()?;
    execute!(stdout, Show, LeaveAlternateScreen)?;

    if let Some(state) = result? {
        println!(
            "Final score {} (level {}, {} hits, {} misses)",
            state.score, state.highest_level_reached, state.hits, state.misses
        );
    }
    Ok(())
}

/// Returns the last finished session, if any.
fn play_loop<W: Write>(
    app: &App,
    level: u32,
    out: &mut W,
) -> Result<Option<SessionState>, Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), Duration::from_millis(REDRAW_MS));
    let grid_size = app.controller.config().grid_size;

    loop {
        draw(out, &app.controller.snapshot(), grid_size)?;

        match runner.step() {
            GameEvent::Tap(cell) => {
                app.controller.tap_hole(cell);
            }
            GameEvent::Replay => {
                if app.controller.snapshot().phase == Phase::Ended {
                    app.controller.flush_persistence();
                    app.controller.start_session(level, &app.unlocked_levels())?;
                }
            }
            GameEvent::Quit => {
                app.controller.end_session();
                let state = app.controller.snapshot();
                return Ok((state.phase == Phase::Ended).then_some(state));
            }
            GameEvent::Resize | GameEvent::Tick => {}
        }
    }
}

fn draw<W: Write>(out: &mut W, state: &SessionState, grid_size: usize) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    let status = match state.phase {
        Phase::Idle => "ready".to_string(),
        Phase::Countdown => format!("get ready... {}", state.countdown_remaining.max(1)),
        Phase::Active if state.final_countdown => format!("{}s left!", state.time_remaining),
        Phase::Active => format!("{}s left", state.time_remaining),
        Phase::Ended => "time! (r) replay  (q) quit".to_string(),
    };
    write!(
        out,
        "score {}  level {}  combo {}  hits {}  misses {}\r\n{}\r\n\r\n",
        state.score, state.level, state.combo, state.hits, state.misses, status
    )?;
    for line in render_grid(state.active_target, grid_size) {
        write!(out, "{line}\r\n")?;
    }
    out.flush()
}

fn render_grid(active: Option<usize>, grid_size: usize) -> Vec<String> {
    let width = (grid_size as f64).sqrt().ceil().max(1.0) as usize;
    (0..grid_size)
        .collect::<Vec<_>>()
        .chunks(width)
        .map(|row| {
            row.iter()
                .map(|cell| if Some(*cell) == active { "[@]" } else { "[ ]" })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
