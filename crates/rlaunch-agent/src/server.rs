//! Unix socket server: panel handshake, periodic roster snapshots and
//! start/stop command execution against the launcher.

use crate::launcher::{LaunchError, Launcher};
use rlaunch_core::wire::{
    decode_frame, encode_frame, CommandError, CommandPayload, CommandRequest,
    CommandResultPayload, RosterSnapshotPayload, WireEnvelope, WireMsg, DEFAULT_MAX_FRAME_BYTES,
};
use std::{
    collections::HashMap,
    fs, io,
    os::unix::fs::PermissionsExt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        unix::{OwnedReadHalf, OwnedWriteHalf},
        UnixListener, UnixStream,
    },
    sync::{mpsc, watch, Mutex, RwLock},
};
use tracing::{debug, info, warn};

const AGENT_SENDER_ID: &str = "rlaunch-agent";
const PANEL_ROLE: &str = "panel";

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub session_id: String,
    pub socket_path: PathBuf,
    pub publish_interval: Duration,
    pub write_timeout: Duration,
    pub queue_capacity: usize,
}

pub async fn run(
    config: AgentConfig,
    launcher: Launcher,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    if let Some(parent) = config.socket_path.parent() {
        fs::create_dir_all(parent)?;
        let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
    }

    if config.socket_path.exists() {
        let _ = fs::remove_file(&config.socket_path);
    }

    let listener = UnixListener::bind(&config.socket_path)?;
    let _ = fs::set_permissions(&config.socket_path, fs::Permissions::from_mode(0o600));

    let agent = Arc::new(AgentHub::new(config.clone(), launcher));
    let publisher = agent.clone().spawn_publisher(shutdown.clone());

    info!(
        event = "agent_start",
        session_id = %config.session_id,
        socket = %config.socket_path.display(),
        publish_interval_ms = config.publish_interval.as_millis() as u64,
        queue_capacity = config.queue_capacity
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accept = listener.accept() => {
                match accept {
                    Ok((stream, _addr)) => {
                        let agent = agent.clone();
                        let conn_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            agent.handle_connection(stream, conn_shutdown).await;
                        });
                    }
                    Err(err) => {
                        warn!(event = "agent_accept_error", error = %err);
                    }
                }
            }
        }
    }

    drop(listener);
    let _ = publisher.await;
    agent.launcher.lock().await.shutdown().await;
    let _ = fs::remove_file(&config.socket_path);
    info!(event = "agent_stop", session_id = %config.session_id);
    Ok(())
}

struct AgentHub {
    config: AgentConfig,
    conn_counter: AtomicU64,
    seq: AtomicU64,
    panels: RwLock<HashMap<String, mpsc::Sender<WireEnvelope>>>,
    launcher: Mutex<Launcher>,
}

impl AgentHub {
    fn new(config: AgentConfig, launcher: Launcher) -> Self {
        Self {
            config,
            conn_counter: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            panels: RwLock::new(HashMap::new()),
            launcher: Mutex::new(launcher),
        }
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("agent-conn-{id}")
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn make_envelope(&self, request_id: Option<String>, msg: WireMsg) -> WireEnvelope {
        WireEnvelope::new(self.config.session_id.clone(), AGENT_SENDER_ID, request_id, msg)
    }

    async fn build_snapshot_envelope(&self) -> WireEnvelope {
        let items = self.launcher.lock().await.snapshot();
        self.make_envelope(
            None,
            WireMsg::RosterSnapshot(RosterSnapshotPayload {
                seq: self.next_seq(),
                items,
            }),
        )
    }

    fn spawn_publisher(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.publish_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let snapshot = self.build_snapshot_envelope().await;
                        self.broadcast(snapshot).await;
                    }
                }
            }
        })
    }

    async fn register_panel(
        &self,
        conn_id: &str,
        client_id: &str,
        sender: mpsc::Sender<WireEnvelope>,
    ) {
        self.panels
            .write()
            .await
            .insert(conn_id.to_string(), sender);
        info!(event = "panel_connected", conn_id = %conn_id, client_id = %client_id);
    }

    async fn unregister_panel(&self, conn_id: &str) {
        if self.panels.write().await.remove(conn_id).is_some() {
            info!(event = "panel_disconnected", conn_id = %conn_id);
        }
    }

    async fn broadcast(&self, envelope: WireEnvelope) {
        let panels = self.panels.read().await.clone();
        let mut dropped = Vec::new();

        for (conn_id, sender) in panels {
            match sender.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped.push(conn_id);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(event = "agent_slow_consumer", conn_id = %conn_id);
                    dropped.push(conn_id);
                }
            }
        }

        for conn_id in dropped {
            self.unregister_panel(&conn_id).await;
        }
    }

    async fn send_to_conn(&self, conn_id: &str, envelope: WireEnvelope) -> bool {
        let sender = self.panels.read().await.get(conn_id).cloned();
        let Some(sender) = sender else {
            return false;
        };

        match sender.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister_panel(conn_id).await;
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = "agent_send_backpressure", conn_id = %conn_id);
                self.unregister_panel(conn_id).await;
                false
            }
        }
    }

    async fn execute(&self, request: &CommandRequest) -> Result<String, LaunchError> {
        let mut launcher = self.launcher.lock().await;
        match request {
            CommandRequest::Start(start) => {
                let pid = launcher.start(start.entry.id, &start.args)?;
                Ok(format!("{} started (pid {pid})", start.entry.name))
            }
            CommandRequest::Stop(stop) => {
                launcher.stop(stop.entry.id)?;
                Ok(format!("{} stopping", stop.entry.name))
            }
        }
    }

    async fn handle_command(
        &self,
        conn_id: &str,
        request_id: Option<String>,
        payload: CommandPayload,
    ) {
        let command = payload.request.name();
        let entry = payload.request.entry();
        let result = match self.execute(&payload.request).await {
            Ok(message) => {
                info!(
                    event = "agent_command_ok",
                    conn_id = %conn_id,
                    command,
                    id = entry.id,
                    name = %entry.name
                );
                CommandResultPayload::ok(command, message)
            }
            Err(err) => {
                warn!(
                    event = "agent_command_error",
                    conn_id = %conn_id,
                    command,
                    id = entry.id,
                    code = err.code(),
                    error = %err
                );
                CommandResultPayload::failed(
                    command,
                    CommandError::new(err.code(), err.to_string()),
                )
            }
        };
        let envelope = self.make_envelope(request_id, WireMsg::CommandResult(result));
        self.send_to_conn(conn_id, envelope).await;
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: UnixStream,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let conn_id = self.next_conn_id();
        let (reader_half, writer_half) = stream.into_split();
        let mut reader = BufReader::new(reader_half);

        let Some(hello) = next_frame_until_shutdown(&mut reader, &mut shutdown).await else {
            return;
        };

        if !hello.version.is_supported() {
            warn!(
                event = "agent_unsupported_version",
                conn_id = %conn_id,
                version = hello.version.0
            );
            return;
        }
        if hello.session_id != self.config.session_id {
            warn!(
                event = "agent_session_mismatch",
                conn_id = %conn_id,
                msg_session = %hello.session_id,
                expected_session = %self.config.session_id
            );
            return;
        }
        let WireMsg::Hello(payload) = hello.msg else {
            warn!(event = "agent_expected_hello", conn_id = %conn_id);
            return;
        };
        if payload.role != PANEL_ROLE {
            warn!(event = "agent_invalid_role", conn_id = %conn_id, role = %payload.role);
            return;
        }

        let (tx, rx) = mpsc::channel::<WireEnvelope>(self.config.queue_capacity);
        let write_timeout = self.config.write_timeout;
        let conn_for_writer = conn_id.clone();
        let writer_task = tokio::spawn(async move {
            writer_loop(conn_for_writer, writer_half, rx, write_timeout).await;
        });

        self.register_panel(&conn_id, &payload.client_id, tx.clone())
            .await;
        let snapshot = self.build_snapshot_envelope().await;
        let _ = tx.send(snapshot).await;

        loop {
            let Some(envelope) = next_frame_until_shutdown(&mut reader, &mut shutdown).await else {
                break;
            };
            if !envelope.version.is_supported() {
                warn!(
                    event = "agent_skip_version",
                    conn_id = %conn_id,
                    version = envelope.version.0
                );
                continue;
            }
            if envelope.session_id != self.config.session_id {
                warn!(
                    event = "agent_message_session_mismatch",
                    conn_id = %conn_id,
                    msg_session = %envelope.session_id,
                    expected_session = %self.config.session_id
                );
                break;
            }

            match envelope.msg {
                WireMsg::Command(payload) => {
                    self.handle_command(&conn_id, envelope.request_id, payload)
                        .await;
                }
                WireMsg::Hello(_) => {
                    warn!(event = "agent_unexpected_hello", conn_id = %conn_id);
                }
                _ => {
                    debug!(event = "agent_ignored_message", conn_id = %conn_id);
                }
            }
        }

        self.unregister_panel(&conn_id).await;
        drop(tx);
        let _ = writer_task.await;
    }
}

async fn writer_loop(
    conn_id: String,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<WireEnvelope>,
    write_timeout: Duration,
) {
    while let Some(envelope) = rx.recv().await {
        let frame = match encode_frame(&envelope, DEFAULT_MAX_FRAME_BYTES) {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "agent_encode_error", conn_id = %conn_id, error = %err);
                continue;
            }
        };
        let send = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        match tokio::time::timeout(write_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(event = "agent_write_error", conn_id = %conn_id, error = %err);
                break;
            }
            Err(_) => {
                warn!(event = "agent_write_timeout", conn_id = %conn_id);
                break;
            }
        }
    }
}

/// Next valid frame, or `None` on EOF or once shutdown has been signalled.
async fn next_frame_until_shutdown(
    reader: &mut BufReader<OwnedReadHalf>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<WireEnvelope> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            frame = read_next_valid_frame(reader) => return frame,
        }
    }
}

async fn read_next_valid_frame(reader: &mut BufReader<OwnedReadHalf>) -> Option<WireEnvelope> {
    loop {
        let mut line = Vec::new();
        let n = match reader.read_until(b'\n', &mut line).await {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "agent_read_error", error = %err);
                return None;
            }
        };
        if n == 0 {
            return None;
        }
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match decode_frame::<WireEnvelope>(&line, DEFAULT_MAX_FRAME_BYTES) {
            Ok(envelope) => return Some(envelope),
            Err(err) => {
                warn!(event = "agent_decode_error", error = %err);
                continue;
            }
        }
    }
}
