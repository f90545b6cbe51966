use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::{CodecLookup, CodecRegistry};
use crate::config::Settings;
use crate::error::TransportError;
use crate::mailbox::{Inbox, mailbox};
use crate::notify::PropertyQueue;
use crate::player::{Player, PlayerOptions, PlayerProperty};
use crate::probe::{self, ProbePool};
use crate::state::{PlaybackState, RepeatMode};
use crate::transport::{LaunchSpec, Session};

use super::event_loop::StatusPrinter;

/// Name of the playlist built from command-line arguments.
pub const SESSION_PLAYLIST: &str = "session";

pub type Engine = Player<Session>;

/// Saved state if there is any, else a fresh state seeded from the settings.
pub fn load_state(settings: &Settings, codecs: &dyn CodecLookup) -> PlaybackState {
    if let Some(path) = settings.state.resolved_path()
        && path.exists()
    {
        match PlaybackState::read_from_file(&path, codecs) {
            Ok(state) => {
                info!(path = %path.display(), playlists = state.playlists().len(), "state restored");
                return state;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read saved state"),
        }
    }

    let mut state = PlaybackState::new();
    state.set_shuffling(settings.playback.shuffle);
    state.set_repeat_mode(RepeatMode::from(settings.playback.repeat));
    state.set_volume(settings.playback.volume);
    state
}

/// Codecs available to the binary. No playlist format ships with the engine,
/// so the registry starts empty: saved playlists are skipped on restore and
/// `save` only writes the state snapshot. Playback settings, metadata and the
/// playing position still persist.
pub fn codec_registry() -> CodecRegistry {
    let registry = CodecRegistry::new();
    if registry.supported_extensions().is_empty() {
        info!("no playlist formats registered, playlists will not be persisted");
    }
    registry
}

/// Wire everything together and start the player process.
pub fn build(settings: &Settings, args: &[PathBuf]) -> Result<(Engine, Inbox<Engine>), TransportError> {
    let codecs: Arc<dyn CodecLookup> = Arc::new(codec_registry());
    let state = load_state(settings, codecs.as_ref());

    let (mailbox, inbox) = mailbox::<Engine>();

    let events = mailbox.clone();
    let session = Session::launch(LaunchSpec::from_settings(&settings.player), move |event| {
        events.post(move |player: &mut Engine| player.on_transport_event(event));
    })?;

    let probes = ProbePool::new(
        probe::from_settings(&settings.probe),
        mailbox.clone(),
        settings.probe.worker_count(),
    );
    let notifier = PropertyQueue::spawn(settings.playback.notify_capacity, |property: PlayerProperty| {
        debug!(?property, "property changed");
    });

    let mut player = Player::new(
        state,
        session,
        mailbox,
        probes,
        codecs,
        PlayerOptions::from_settings(settings),
    )
    .with_events(StatusPrinter)
    .with_notifier(notifier);

    player.sync_output();

    if !args.is_empty() {
        start_session_playlist(&mut player, settings, args);
    }
    Ok((player, inbox))
}

/// Where playlists declared at runtime live: next to the state file.
pub fn playlist_dir(settings: &Settings) -> PathBuf {
    settings
        .state
        .resolved_path()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_default()
}

/// Collect the command-line files into the session playlist and play it.
fn start_session_playlist(player: &mut Engine, settings: &Settings, args: &[PathBuf]) {
    let state = player.state_mut();
    state.delete_playlist(SESSION_PLAYLIST);
    state.create_playlist(SESSION_PLAYLIST, playlist_dir(settings).join(format!("{SESSION_PLAYLIST}.m3u")));

    match player.add_files(SESSION_PLAYLIST, 0, true, args) {
        Some(range) => {
            info!(tracks = range.len(), "session playlist ready");
            player.play_track(SESSION_PLAYLIST, 0);
        }
        None => warn!("no playable files among the arguments"),
    }
}
