use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use std::{fs, io};

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::PlayerSettings;
use crate::error::{CommandError, TransportError};

use super::Transport;
use super::ipc::{self, Message};
use super::types::{Completion, EndReason, Observed, PlayState, PlayTime, TransportEvent, log_failure};

/// Flags every session starts the player with, ahead of any extra arguments.
const STARTUP_FLAGS: [&str; 6] = [
    "--idle",
    "--quiet",
    "--pause",
    "--no-input-terminal",
    "--gapless-audio=weak",
    "--no-video",
];

const EVENTS: [&str; 3] = ["idle", "start-file", "end-file"];

/// How to start the player process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub extra_args: Vec<String>,
    /// Use exactly this socket path instead of generating one.
    pub socket_path: Option<PathBuf>,
    pub socket_dir: PathBuf,
    pub connect_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self::from_settings(&PlayerSettings::default())
    }
}

impl LaunchSpec {
    pub fn from_settings(settings: &PlayerSettings) -> Self {
        Self {
            program: settings.program.clone(),
            extra_args: settings.extra_args.clone(),
            socket_path: None,
            socket_dir: settings
                .socket_dir
                .clone()
                .unwrap_or_else(default_socket_dir),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            shutdown_grace: Duration::from_millis(settings.shutdown_grace_ms),
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub(super) fn resolve_socket_path(&self) -> PathBuf {
        if let Some(path) = &self.socket_path {
            return path.clone();
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.socket_dir
            .join(format!("{millis}-{:08x}.sock", rand::random::<u32>()))
    }
}

fn default_socket_dir() -> PathBuf {
    std::env::temp_dir().join("reprise").join("mpv")
}

type Sink = Box<dyn FnMut(TransportEvent) + Send + 'static>;

/// State shared with the listener thread.
struct Shared {
    writer: Mutex<UnixStream>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    play_state: Arc<PlayState>,
    stopping: AtomicBool,
}

#[derive(Default)]
struct Pending {
    completions: HashMap<u64, Completion>,
    closed: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn send(&self, command: Vec<Value>, done: Completion) -> Result<(), TransportError> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = ipc::encode(&command, id)?;

        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(TransportError::Closed);
            }
            pending.completions.insert(id, done);
        }

        let written = lock(&self.writer).write_all(&line);
        if let Err(e) = written {
            lock(&self.pending).completions.remove(&id);
            return Err(TransportError::Io(e));
        }
        debug!(request_id = id, ?command, "sent");
        Ok(())
    }

    fn complete(&self, request_id: u64, result: Result<(), CommandError>) {
        let Some(done) = lock(&self.pending).completions.remove(&request_id) else {
            debug!(request_id, "reply for unknown request");
            return;
        };
        run_completion(done, result);
    }

    /// Fail every outstanding command and refuse new ones.
    fn close(&self) {
        let drained: Vec<Completion> = {
            let mut pending = lock(&self.pending);
            pending.closed = true;
            pending.completions.drain().map(|(_, done)| done).collect()
        };
        for done in drained {
            run_completion(done, Err(CommandError::Closed));
        }
    }
}

fn run_completion(done: Completion, result: Result<(), CommandError>) {
    if catch_unwind(AssertUnwindSafe(move || done(result))).is_err() {
        error!("command completion panicked");
    }
}

/// A running player process and its control channel.
pub struct Session {
    shared: Arc<Shared>,
    socket_path: PathBuf,
    grace: Duration,
    child: Mutex<Option<Child>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    stderr: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start the player, connect to it and subscribe to the events the
    /// engine needs. `sink` receives every event on the listener thread.
    ///
    /// Nothing is left running when this fails.
    pub fn launch(
        spec: LaunchSpec,
        sink: impl FnMut(TransportEvent) + Send + 'static,
    ) -> Result<Self, TransportError> {
        let socket_path = spec.resolve_socket_path();
        if let Some(dir) = socket_path.parent() {
            fs::create_dir_all(dir).map_err(|source| TransportError::SocketDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut child = Command::new(&spec.program)
            .args(STARTUP_FLAGS)
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .args(&spec.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: spec.program.clone(),
                source,
            })?;
        info!(program = %spec.program, pid = child.id(), socket = %socket_path.display(), "player started");

        let stderr = child.stderr.take().and_then(forward_stderr);

        let connected = connect(&socket_path, &mut child, spec.connect_timeout)
            .and_then(|stream| Ok((stream.try_clone()?, stream)));
        let (reader, stream) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                terminate(&mut child, Duration::ZERO);
                remove_socket(&socket_path);
                if let Some(handle) = stderr {
                    let _ = handle.join();
                }
                return Err(e);
            }
        };

        let session = Self {
            shared: Arc::new(Shared {
                writer: Mutex::new(stream),
                pending: Mutex::new(Pending::default()),
                next_id: AtomicU64::new(1),
                play_state: Arc::new(PlayState::default()),
                stopping: AtomicBool::new(false),
            }),
            socket_path,
            grace: spec.shutdown_grace,
            child: Mutex::new(Some(child)),
            listener: Mutex::new(None),
            stderr: Mutex::new(stderr),
        };

        let shared = session.shared.clone();
        let sink: Sink = Box::new(sink);
        let listener = thread::Builder::new()
            .name("reprise-ipc".to_string())
            .spawn(move || listen(reader, shared, sink));
        match listener {
            Ok(handle) => *lock(&session.listener) = Some(handle),
            Err(e) => {
                session.shutdown(Duration::ZERO);
                return Err(TransportError::Io(e));
            }
        }

        if let Err(e) = session.subscribe(spec.connect_timeout) {
            session.shutdown(Duration::ZERO);
            return Err(e);
        }
        debug!("session ready");
        Ok(session)
    }

    /// Enable the events and observe the properties, waiting for each reply.
    fn subscribe(&self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;

        let mut commands: Vec<(String, Vec<Value>)> = EVENTS
            .iter()
            .map(|e| (format!("enable_event {e}"), vec![json!("enable_event"), json!(e)]))
            .collect();
        commands.extend(Observed::ALL.iter().map(|o| {
            (
                format!("observe_property {}", o.name()),
                vec![json!("observe_property"), json!(o.id()), json!(o.name())],
            )
        }));

        for (what, command) in commands {
            let (tx, rx) = mpsc::channel();
            self.shared.send(
                command,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )?;
            let wait = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(TransportError::Setup {
                        what,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    return Err(TransportError::Setup {
                        what,
                        reason: "no reply before the deadline".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn play_state(&self) -> Arc<PlayState> {
        self.shared.play_state.clone()
    }

    /// Send an arbitrary command.
    pub fn command(&self, command: Vec<Value>, done: Completion) -> Result<(), TransportError> {
        self.shared.send(command, done)
    }

    /// Close the channel and end the process. Safe to call more than once.
    pub fn stop(&self) {
        self.shutdown(self.grace);
    }

    fn shutdown(&self, grace: Duration) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("stopping session");

        if let Err(e) = lock(&self.shared.writer).shutdown(std::net::Shutdown::Both)
            && e.kind() != io::ErrorKind::NotConnected
        {
            warn!(error = %e, "failed to shut down control socket");
        }

        if let Some(mut child) = lock(&self.child).take() {
            terminate(&mut child, grace);
        }
        remove_socket(&self.socket_path);

        if let Some(handle) = lock(&self.listener).take()
            && handle.join().is_err()
        {
            error!("listener thread panicked");
        }
        if let Some(handle) = lock(&self.stderr).take() {
            let _ = handle.join();
        }
        self.shared.close();
        info!("session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Transport for Session {
    fn play_track(&self, path: &Path, next: Option<&Path>, done: Completion) -> Result<(), TransportError> {
        self.shared.send(vec![json!("loadfile"), path_value(path), json!("replace")], done)?;
        if let Some(next) = next {
            self.shared.send(
                vec![json!("loadfile"), path_value(next), json!("append")],
                log_failure("preload next"),
            )?;
        }
        Ok(())
    }

    fn queue_next(&self, next: Option<&Path>, done: Completion) -> Result<(), TransportError> {
        let Some(next) = next else {
            return self.shared.send(vec![json!("playlist-clear")], done);
        };
        self.shared.send(vec![json!("playlist-clear")], log_failure("playlist-clear"))?;
        self.shared
            .send(vec![json!("loadfile"), path_value(next), json!("append")], done)
    }

    fn seek(&self, position: Duration, done: Completion) -> Result<(), TransportError> {
        self.shared.send(
            vec![json!("seek"), json!(position.as_secs_f64()), json!("absolute")],
            done,
        )
    }

    fn set_play(&self, playing: bool, done: Completion) -> Result<(), TransportError> {
        self.shared
            .send(vec![json!("set_property"), json!("pause"), json!(!playing)], done)
    }

    fn set_volume(&self, percent: f64, done: Completion) -> Result<(), TransportError> {
        self.shared
            .send(vec![json!("set_property"), json!("volume"), json!(percent)], done)
    }

    fn set_mute(&self, muted: bool, done: Completion) -> Result<(), TransportError> {
        self.shared
            .send(vec![json!("set_property"), json!("mute"), json!(muted)], done)
    }

    fn play_time(&self) -> PlayTime {
        self.shared.play_state.snapshot()
    }
}

fn path_value(path: &Path) -> Value {
    json!(path.to_string_lossy())
}

fn connect(path: &Path, child: &mut Child, timeout: Duration) -> Result<UnixStream, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if let Some(status) = child.try_wait()? {
                    return Err(TransportError::Exited(status));
                }
                if Instant::now() >= deadline {
                    debug!(error = %e, "last connect attempt failed");
                    return Err(TransportError::Connect {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

/// Ask the process to exit with SIGINT, then kill it once `grace` is over.
fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if !grace.is_zero() {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) has no memory-safety preconditions; the pid is
            // our own unreaped child.
            unsafe {
                libc::kill(pid, libc::SIGINT);
            }
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "player exited");
                    return;
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    warn!(error = %e, "failed to poll player process");
                    break;
                }
            }
        }
        warn!(?grace, "player ignored SIGINT; killing");
    }

    if let Err(e) = child.kill()
        && e.kind() != io::ErrorKind::InvalidInput
    {
        warn!(error = %e, "failed to kill player");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "failed to reap player");
    }
}

fn remove_socket(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove socket");
    }
}

fn forward_stderr(pipe: std::process::ChildStderr) -> Option<JoinHandle<()>> {
    thread::Builder::new()
        .name("reprise-mpv-log".to_string())
        .spawn(move || {
            for line in BufReader::new(pipe).lines() {
                match line {
                    Ok(line) if !line.trim().is_empty() => debug!(target: "mpv", "{line}"),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })
        .inspect_err(|e| warn!(error = %e, "failed to start stderr forwarder"))
        .ok()
}

fn listen(stream: UnixStream, shared: Arc<Shared>, mut sink: Sink) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !shared.stopping.load(Ordering::SeqCst) {
                    warn!(error = %e, "control socket read failed");
                }
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match ipc::decode(line) {
            Ok(Some(message)) => dispatch(message, &shared, &mut sink),
            Ok(None) => debug!(line, "ignored message"),
            Err(e) => warn!(error = %e, line, "malformed message"),
        }
    }

    shared.close();
    if !shared.stopping.load(Ordering::SeqCst) {
        warn!("control channel closed unexpectedly");
        sink(TransportEvent::Disconnected);
    }
    debug!("listener finished");
}

fn dispatch(message: Message, shared: &Shared, sink: &mut Sink) {
    match message {
        Message::Reply { request_id, result } => shared.complete(request_id, result),
        Message::Property { id, name, data } => {
            let property = if id == Observed::UNTAGGED {
                Observed::from_name(&name)
            } else {
                Observed::from_id(id)
            };
            match property {
                Some(property) => on_property(property, data, shared, sink),
                None => debug!(id, name, "change for unobserved property"),
            }
        }
        Message::Event {
            name,
            reason,
            file_error,
        } => match name.as_str() {
            "idle" => sink(TransportEvent::Idle),
            "start-file" => sink(TransportEvent::FileStarted),
            "end-file" => {
                let reason = EndReason::from_wire(reason.as_deref().unwrap_or(""), file_error.as_deref());
                sink(TransportEvent::FileEnded(reason));
            }
            other => debug!(event = other, "unhandled event"),
        },
    }
}

fn on_property(property: Observed, data: Value, shared: &Shared, sink: &mut Sink) {
    let state = &shared.play_state;
    match (property, data) {
        (Observed::Pause, Value::Bool(paused)) => sink(TransportEvent::PauseChanged(paused)),
        (Observed::AudioBitrate, Value::Number(n)) => {
            let bps = n.as_f64().unwrap_or_default();
            state.set_bitrate(bps);
            sink(TransportEvent::BitrateChanged(bps));
        }
        (Observed::TimePos, Value::Number(n)) => state.set_position(n.as_f64().unwrap_or_default()),
        (Observed::TimeRemaining, Value::Number(n)) => {
            state.set_remaining(n.as_f64().unwrap_or_default())
        }
        // Unavailable while nothing is loaded.
        (Observed::AudioBitrate, Value::Null) => state.set_bitrate(0.0),
        (Observed::TimePos, Value::Null) => state.set_position(0.0),
        (Observed::TimeRemaining, Value::Null) => state.set_remaining(0.0),
        (property, data) => {
            warn!(property = property.name(), %data, "unexpected property value");
        }
    }
}
