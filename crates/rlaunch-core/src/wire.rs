//! NDJSON framing and message types shared by the agent and the panel.
//!
//! Every frame is one JSON object terminated by `\n`. The envelope carries
//! routing metadata and the message itself is flattened into it as
//! `{"type": ..., "payload": ...}`.

use crate::record::{LaunchEntry, StartRequest, StopRequest};
use chrono::Utc;
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const CURRENT_PROTOCOL_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    pub const CURRENT: Self = Self(CURRENT_PROTOCOL_VERSION);

    pub fn is_supported(self) -> bool {
        self.0 <= CURRENT_PROTOCOL_VERSION
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct VersionVisitor;

        impl<'de> Visitor<'de> for VersionVisitor {
            type Value = ProtocolVersion;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a protocol version as string or integer")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u16::try_from(value)
                    .map(ProtocolVersion)
                    .map_err(|_| E::custom(format!("protocol version out of range: {value}")))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let unsigned = u64::try_from(value).map_err(|_| {
                    E::custom(format!("protocol version cannot be negative: {value}"))
                })?;
                self.visit_u64(unsigned)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .trim()
                    .trim_start_matches('v')
                    .parse::<u16>()
                    .map(ProtocolVersion)
                    .map_err(|err| E::custom(format!("invalid protocol version '{value}': {err}")))
            }
        }

        deserializer.deserialize_any(VersionVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEnvelope {
    #[serde(default)]
    pub version: ProtocolVersion,
    pub session_id: String,
    pub sender_id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub msg: WireMsg,
}

impl WireEnvelope {
    /// Stamps `msg` with the current protocol version and wall-clock time.
    pub fn new(
        session_id: impl Into<String>,
        sender_id: impl Into<String>,
        request_id: Option<String>,
        msg: WireMsg,
    ) -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            session_id: session_id.into(),
            sender_id: sender_id.into(),
            timestamp: Utc::now().to_rfc3339(),
            request_id,
            msg,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WireMsg {
    Hello(HelloPayload),
    RosterSnapshot(RosterSnapshotPayload),
    Command(CommandPayload),
    CommandResult(CommandResultPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloPayload {
    pub client_id: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterSnapshotPayload {
    pub seq: u64,
    #[serde(default)]
    pub items: Vec<LaunchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandPayload {
    pub request: CommandRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandRequest {
    Start(StartRequest),
    Stop(StopRequest),
}

impl CommandRequest {
    pub fn name(&self) -> &'static str {
        match self {
            CommandRequest::Start(_) => "start",
            CommandRequest::Stop(_) => "stop",
        }
    }

    pub fn entry(&self) -> &LaunchEntry {
        match self {
            CommandRequest::Start(request) => &request.entry,
            CommandRequest::Stop(request) => &request.entry,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResultPayload {
    pub command: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<CommandError>,
}

impl CommandResultPayload {
    pub fn ok(command: &str, message: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            status: "ok".to_string(),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(command: &str, error: CommandError) -> Self {
        Self {
            command: command.to_string(),
            status: "error".to_string(),
            message: Some(error.message.clone()),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl CommandError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("buffer exceeds max size without delimiter: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct DecodeReport<T> {
    pub frames: Vec<T>,
    pub errors: Vec<FrameError>,
}

impl<T> Default for DecodeReport<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub fn encode_frame<T: Serialize>(
    value: &T,
    max_frame_bytes: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut encoded =
        serde_json::to_vec(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    encoded.push(b'\n');
    Ok(encoded)
}

pub fn decode_frame<T: DeserializeOwned>(
    bytes: &[u8],
    max_frame_bytes: usize,
) -> Result<T, FrameError> {
    parse_line(strip_line_ending(bytes), max_frame_bytes)
}

fn strip_line_ending(mut raw: &[u8]) -> &[u8] {
    if let Some(rest) = raw.strip_suffix(b"\n") {
        raw = rest;
    }
    if let Some(rest) = raw.strip_suffix(b"\r") {
        raw = rest;
    }
    raw
}

fn parse_line<T: DeserializeOwned>(line: &[u8], max_frame_bytes: usize) -> Result<T, FrameError> {
    if line.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: line.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_slice(line).map_err(|err| FrameError::Decode(err.to_string()))
}

/// Incremental decoder for a byte stream of NDJSON frames.
///
/// A malformed or oversized line is reported and skipped; decoding resumes
/// at the next newline.
pub struct NdjsonFrameDecoder<T> {
    max_frame_bytes: usize,
    pending: Vec<u8>,
    marker: PhantomData<T>,
}

impl<T> NdjsonFrameDecoder<T> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<T> Default for NdjsonFrameDecoder<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl<T: DeserializeOwned> NdjsonFrameDecoder<T> {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport<T> {
        let mut report = DecodeReport::default();
        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.decode_into(strip_line_ending(&line), &mut report);
        }

        if self.pending.len() > self.max_frame_bytes {
            report.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
        }

        report
    }

    pub fn finish(&mut self) -> DecodeReport<T> {
        let mut report = DecodeReport::default();
        let trailing = std::mem::take(&mut self.pending);
        self.decode_into(strip_line_ending(&trailing), &mut report);
        report
    }

    fn decode_into(&self, line: &[u8], report: &mut DecodeReport<T>) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        match parse_line(line, self.max_frame_bytes) {
            Ok(frame) => report.frames.push(frame),
            Err(err) => report.errors.push(err),
        }
    }
}
