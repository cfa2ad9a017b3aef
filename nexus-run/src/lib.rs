//! Streaming run engine: retrieval, LLM streaming with cancellation and
//! heartbeats, optional TTS, and SSE event framing.

pub mod cancellation;
pub mod engine;
pub mod events;
pub mod llm;
pub mod tts;

pub use cancellation::{cancel_pair, CancelHandle, CancelToken};
pub use engine::{resume_unsupported_events, RunEngine, RunRequest, DEFAULT_HEARTBEAT_INTERVAL};
pub use events::{Envelope, RunEvent, SeqCounter};
pub use llm::{FakeLlmClient, LlmClient};
pub use tts::{FakeTtsClient, NoopTtsClient, TtsClient};
