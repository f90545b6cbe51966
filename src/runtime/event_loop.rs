use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::mailbox::{Inbox, Mailbox};
use crate::player::{PlaybackStatus, PlayerEvents};
use crate::state::{RepeatMode, TrackInfo};
use crate::transport::PlayTime;

use super::startup::Engine;

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Track numbers are 1-based.
    Play { playlist: String, number: usize },
    Next,
    Prev,
    Pause,
    Resume,
    Toggle,
    Seek(Duration),
    Volume(f64),
    Mute(bool),
    Shuffle(bool),
    /// `None` cycles to the next mode.
    Repeat(Option<RepeatMode>),
    Add { playlist: String, paths: Vec<PathBuf> },
    Open(PathBuf),
    Probe { playlist: String, force: bool },
    Save,
    Quit,
}

fn on_off(word: Option<&str>) -> Result<bool, String> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err("expected on|off".to_string()),
    }
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    word.ok_or_else(|| format!("missing {what}"))?
        .parse()
        .map_err(|_| format!("invalid {what}"))
}

/// Parse one input line. Blank lines give `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb {
        "play" => {
            let playlist = words.next().ok_or("usage: play <playlist> <n>")?.to_string();
            let number: usize = number(words.next(), "track number")?;
            if number == 0 {
                return Err("track numbers start at 1".to_string());
            }
            Command::Play { playlist, number }
        }
        "next" => Command::Next,
        "prev" => Command::Prev,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "toggle" => Command::Toggle,
        "seek" => {
            let secs: f64 = number(words.next(), "position")?;
            let position = Duration::try_from_secs_f64(secs)
                .map_err(|_| "position must be a non-negative number of seconds".to_string())?;
            Command::Seek(position)
        }
        "vol" => {
            let pct: f64 = number(words.next(), "volume")?;
            if !pct.is_finite() {
                return Err("invalid volume".to_string());
            }
            Command::Volume(pct)
        }
        "mute" => Command::Mute(on_off(words.next())?),
        "shuffle" => Command::Shuffle(on_off(words.next())?),
        "repeat" => Command::Repeat(match words.next() {
            Some("none") => Some(RepeatMode::None),
            Some("all") => Some(RepeatMode::All),
            Some("single") => Some(RepeatMode::Single),
            Some("cycle") => None,
            _ => return Err("expected none|all|single|cycle".to_string()),
        }),
        "add" => {
            let playlist = words.next().ok_or("usage: add <playlist> <paths…>")?.to_string();
            let paths: Vec<PathBuf> = words.by_ref().map(PathBuf::from).collect();
            if paths.is_empty() {
                return Err("usage: add <playlist> <paths…>".to_string());
            }
            Command::Add { playlist, paths }
        }
        "open" => Command::Open(PathBuf::from(words.next().ok_or("usage: open <file>")?)),
        "probe" => {
            let playlist = words.next().ok_or("usage: probe <playlist> [force]")?.to_string();
            let force = match words.next() {
                None => false,
                Some("force") => true,
                Some(_) => return Err("usage: probe <playlist> [force]".to_string()),
            };
            Command::Probe { playlist, force }
        }
        "save" => Command::Save,
        "quit" | "q" => Command::Quit,
        other => return Err(format!("unknown command: {other}")),
    };

    if words.next().is_some() {
        return Err(format!("too many arguments for {verb}"));
    }
    Ok(Some(command))
}

/// Apply a parsed command to the player. Unknown playlists named by `add` are
/// declared next to the state file, in `playlist_dir`.
pub fn apply(player: &mut Engine, command: Command, playlist_dir: &Path) {
    match command {
        Command::Play { playlist, number } => {
            if !player.play_track(&playlist, number - 1) {
                println!("no track {number} in playlist {playlist}");
            }
        }
        Command::Next => {
            player.next();
        }
        Command::Prev => {
            player.previous();
        }
        Command::Pause => player.set_play(false),
        Command::Resume => player.set_play(true),
        Command::Toggle => player.toggle_pause(),
        Command::Seek(position) => player.seek(position),
        Command::Volume(pct) => player.set_volume(pct),
        Command::Mute(on) => player.set_mute(on),
        Command::Shuffle(on) => player.set_shuffle(on),
        Command::Repeat(Some(mode)) => player.set_repeat(mode),
        Command::Repeat(None) => {
            let mode = player.cycle_repeat();
            println!("repeat: {}", mode.as_str());
        }
        Command::Add { playlist, paths } => {
            if player.state().playlist(&playlist).is_none() {
                let path = playlist_dir.join(format!("{playlist}.m3u"));
                player.state_mut().create_playlist(&playlist, path);
            }
            let end = player.state().playlist(&playlist).map_or(0, |p| p.len());
            match player.add_files(&playlist, end, true, &paths) {
                Some(range) => println!("added {} track(s) to {playlist}", range.len()),
                None => println!("nothing to add"),
            }
        }
        Command::Open(path) => player.open_playlist(&path),
        Command::Probe { playlist, force } => {
            let submitted = player.probe_playlist(&playlist, force);
            debug!(playlist, submitted, force, "probe requested");
        }
        Command::Save => player.save_all(),
        // Handled by the reader before it gets here.
        Command::Quit => {}
    }
}

/// Read commands from stdin on a background thread. Parsed commands are posted
/// to the consumer; `quit` or end of input raise `quit` and wake the loop.
pub fn spawn_input(mailbox: Mailbox<Engine>, quit: Arc<AtomicBool>, playlist_dir: PathBuf) {
    let spawned = thread::Builder::new()
        .name("reprise-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        let dir = playlist_dir.clone();
                        if !mailbox.post(move |player: &mut Engine| apply(player, command, &dir)) {
                            return;
                        }
                    }
                    Err(msg) => println!("{msg}"),
                }
            }
            quit.store(true, Ordering::SeqCst);
            mailbox.post(|_: &mut Engine| {});
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start the input reader");
    }
}

/// The consumer loop. Runs posted tasks, polls the playback clock every
/// `poll_interval` and returns once quit is requested, every producer is
/// gone or the transport is lost.
pub fn run(player: &mut Engine, inbox: &Inbox<Engine>, quit: &AtomicBool, poll_interval: Duration) {
    let mut next_poll = Instant::now() + poll_interval;
    loop {
        let timeout = next_poll.saturating_duration_since(Instant::now());
        if inbox.run_once(player, timeout).is_err() {
            debug!("all producers gone");
            break;
        }
        if quit.load(Ordering::SeqCst) {
            info!("quit requested");
            break;
        }
        if player.transport_lost() {
            warn!("player process went away, exiting");
            break;
        }
        if Instant::now() >= next_poll {
            player.poll();
            next_poll = Instant::now() + poll_interval;
        }
    }
}

fn clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Prints playback changes to stdout.
#[derive(Debug, Default)]
pub struct StatusPrinter;

impl PlayerEvents for StatusPrinter {
    fn on_pause_update(&mut self, paused: bool) {
        let status = if paused {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Playing
        };
        println!("[{}]", status.as_str());
    }

    fn on_position_change(&mut self, time: PlayTime) {
        debug!(position = %clock(time.position), total = %clock(time.total()), "position");
    }

    fn on_song_finish(&mut self, error: Option<&str>) {
        if let Some(error) = error {
            println!("playback failed: {error}");
        }
    }

    fn on_track_change(&mut self, track: Option<&TrackInfo>) {
        match track {
            Some(t) if t.artist.is_empty() => println!("▶ {} ({})", t.title, clock(t.length)),
            Some(t) => println!("▶ {} - {} ({})", t.artist, t.title, clock(t.length)),
            None => println!("[{}]", PlaybackStatus::Stopped.as_str()),
        }
    }

    fn on_transport_lost(&mut self) {
        println!("player process exited");
    }
}
