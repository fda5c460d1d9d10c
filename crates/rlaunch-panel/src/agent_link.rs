//! Connection to the launch agent: reconnecting reader loop and the
//! fire-and-forget command queue behind the core's `CommandTransport`.

use crate::config::Config;
use rlaunch_core::runtime::next_backoff;
use rlaunch_core::wire::{
    encode_frame, CommandPayload, CommandRequest, CommandResultPayload, HelloPayload,
    NdjsonFrameDecoder, RosterSnapshotPayload, WireEnvelope, WireMsg, DEFAULT_MAX_FRAME_BYTES,
};
use rlaunch_core::{CommandTransport, StartRequest, StopRequest};
use std::cell::Cell;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const COMMAND_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    Connected,
    Disconnected,
    Snapshot(RosterSnapshotPayload),
    CommandResult {
        request_id: Option<String>,
        payload: CommandResultPayload,
    },
}

#[derive(Debug, Clone)]
pub struct OutboundCommand {
    pub request_id: String,
    pub request: CommandRequest,
}

/// Enqueues commands without waiting. A full or closed queue drops the
/// command; the next snapshot still reflects the agent's real state.
pub struct QueueTransport {
    tx: mpsc::Sender<OutboundCommand>,
    next_id: Cell<u64>,
}

impl QueueTransport {
    pub fn new(tx: mpsc::Sender<OutboundCommand>) -> Self {
        Self {
            tx,
            next_id: Cell::new(0),
        }
    }

    fn enqueue(&self, request: CommandRequest) {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let command = request.name();
        let entry_id = request.entry().id;
        let outbound = OutboundCommand {
            request_id: format!("panel-cmd-{id}"),
            request,
        };
        match self.tx.try_send(outbound) {
            Ok(()) => {
                debug!(event = "command_queued", command, id = entry_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = "command_queue_full", command, id = entry_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event = "command_queue_closed", command, id = entry_id);
            }
        }
    }
}

impl CommandTransport for QueueTransport {
    fn start(&self, request: StartRequest) {
        self.enqueue(CommandRequest::Start(request));
    }

    fn stop(&self, request: StopRequest) {
        self.enqueue(CommandRequest::Stop(request));
    }
}

pub fn build_hello(config: &Config) -> WireEnvelope {
    WireEnvelope::new(
        config.session_id.clone(),
        config.client_id.clone(),
        None,
        WireMsg::Hello(HelloPayload {
            client_id: config.client_id.clone(),
            role: "panel".to_string(),
            capabilities: vec!["roster".to_string(), "command".to_string()],
        }),
    )
}

fn build_command_envelope(config: &Config, command: OutboundCommand) -> WireEnvelope {
    WireEnvelope::new(
        config.session_id.clone(),
        config.client_id.clone(),
        Some(command.request_id),
        WireMsg::Command(CommandPayload {
            request: command.request,
        }),
    )
}

async fn send_wire_envelope(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    envelope: &WireEnvelope,
) -> io::Result<()> {
    let frame = encode_frame(envelope, DEFAULT_MAX_FRAME_BYTES)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Commands clicked while the link was down are never replayed to a new
/// connection; the next snapshot shows the operator the real state instead.
fn drop_stale_commands(command_rx: &mut mpsc::Receiver<OutboundCommand>) {
    while let Ok(command) = command_rx.try_recv() {
        warn!(
            event = "command_dropped_offline",
            request_id = %command.request_id,
            command = command.request.name(),
            id = command.request.entry().id
        );
    }
}

/// Runs until the event receiver is dropped.
pub async fn agent_loop(
    config: Config,
    tx: mpsc::Sender<AgentEvent>,
    mut command_rx: mpsc::Receiver<OutboundCommand>,
) {
    let mut backoff = Duration::from_secs(1);
    let mut command_open = true;

    while !tx.is_closed() {
        let stream = match UnixStream::connect(&config.socket_path).await {
            Ok(stream) => stream,
            Err(err) => {
                debug!(
                    event = "agent_connect_error",
                    socket = %config.socket_path.display(),
                    error = %err
                );
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = Duration::from_secs(1);
        drop_stale_commands(&mut command_rx);

        let (reader_half, mut writer_half) = stream.into_split();
        if let Err(err) = send_wire_envelope(&mut writer_half, &build_hello(&config)).await {
            warn!(event = "agent_hello_failed", error = %err);
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
            continue;
        }

        info!(event = "agent_connected", socket = %config.socket_path.display());
        let _ = tx.send(AgentEvent::Connected).await;
        let mut reader = BufReader::new(reader_half);
        let mut decoder = NdjsonFrameDecoder::<WireEnvelope>::new(DEFAULT_MAX_FRAME_BYTES);
        let mut read_buf = [0u8; 8192];
        let mut last_seq = 0u64;

        loop {
            tokio::select! {
                read = reader.read(&mut read_buf) => {
                    let read = match read {
                        Ok(value) => value,
                        Err(err) => {
                            warn!(event = "agent_read_error", error = %err);
                            break;
                        }
                    };
                    if read == 0 {
                        break;
                    }
                    let report = decoder.push_chunk(&read_buf[..read]);
                    for err in report.errors {
                        warn!(event = "agent_decode_error", error = %err);
                    }
                    for envelope in report.frames {
                        if envelope.session_id != config.session_id
                            || !envelope.version.is_supported()
                        {
                            continue;
                        }
                        match envelope.msg {
                            WireMsg::RosterSnapshot(payload) => {
                                if payload.seq <= last_seq {
                                    debug!(event = "stale_snapshot", seq = payload.seq, last_seq);
                                    continue;
                                }
                                last_seq = payload.seq;
                                let _ = tx.send(AgentEvent::Snapshot(payload)).await;
                            }
                            WireMsg::CommandResult(payload) => {
                                let _ = tx
                                    .send(AgentEvent::CommandResult {
                                        request_id: envelope.request_id,
                                        payload,
                                    })
                                    .await;
                            }
                            _ => {}
                        }
                    }
                }
                maybe_command = command_rx.recv(), if command_open => {
                    match maybe_command {
                        Some(command) => {
                            let envelope = build_command_envelope(&config, command);
                            if send_wire_envelope(&mut writer_half, &envelope).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            command_open = false;
                        }
                    }
                }
            }
        }

        let final_report = decoder.finish();
        for err in final_report.errors {
            warn!(event = "agent_decode_error", error = %err);
        }
        info!(event = "agent_disconnected");
        let _ = tx.send(AgentEvent::Disconnected).await;
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}
