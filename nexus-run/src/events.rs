//! SSE event vocabulary and framing envelope (spec §4.9, §6).

use chrono::{DateTime, Utc};
use nexus_core::ids::RequestId;
use nexus_retrieval::RetrievedChunk;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name")]
pub enum RunEvent {
    #[serde(rename = "request.accepted")]
    RequestAccepted,
    #[serde(rename = "token.delta")]
    TokenDelta { text: String },
    #[serde(rename = "message.final")]
    MessageFinal { text: String },
    #[serde(rename = "audio.ready")]
    AudioReady { url: String },
    #[serde(rename = "audio.error")]
    AudioError { message: String },
    #[serde(rename = "debug.retrieval")]
    DebugRetrieval { chunks: Vec<RetrievedChunk> },
    #[serde(rename = "heartbeat")]
    Heartbeat { ts: DateTime<Utc> },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "resume.unsupported")]
    ResumeUnsupported,
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RequestAccepted => "request.accepted",
            RunEvent::TokenDelta { .. } => "token.delta",
            RunEvent::MessageFinal { .. } => "message.final",
            RunEvent::AudioReady { .. } => "audio.ready",
            RunEvent::AudioError { .. } => "audio.error",
            RunEvent::DebugRetrieval { .. } => "debug.retrieval",
            RunEvent::Heartbeat { .. } => "heartbeat",
            RunEvent::Error { .. } => "error",
            RunEvent::Done => "done",
            RunEvent::ResumeUnsupported => "resume.unsupported",
        }
    }
}

/// Wraps every emitted event with the monotonic, gap-free `seq` and the
/// owning `request_id` the spec requires on every frame.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub request_id: RequestId,
    pub seq: u64,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Gap-free monotonic sequence counter, one per request.
#[derive(Default)]
pub struct SeqCounter(u64);

impl SeqCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> u64 {
        let seq = self.0;
        self.0 += 1;
        seq
    }
}
