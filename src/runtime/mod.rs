use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{info, warn};

use crate::logging;

mod event_loop;
mod settings;
mod startup;

pub use event_loop::{Command, StatusPrinter, parse_command};
pub use settings::load_settings;
pub use startup::{Engine, SESSION_PLAYLIST, codec_registry, load_state};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (settings, problem) = settings::load_settings();
    logging::init(&settings.log);
    if let Some(problem) = problem {
        warn!("{problem}");
    }

    let args: Vec<PathBuf> = env::args_os().skip(1).map(PathBuf::from).collect();
    let (mut player, inbox) = startup::build(&settings, &args)?;

    let quit = Arc::new(AtomicBool::new(false));
    event_loop::spawn_input(
        player.mailbox().clone(),
        Arc::clone(&quit),
        startup::playlist_dir(&settings),
    );

    let poll_interval = Duration::from_millis(settings.playback.poll_interval_ms.max(1));
    event_loop::run(&mut player, &inbox, &quit, poll_interval);

    player.transport().stop();
    player.shutdown();
    info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests;
