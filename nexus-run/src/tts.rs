//! Pluggable text-to-speech client (spec §4.9, §9: adapter internals out of
//! scope). Errors surface as the `audio.error` SSE event, never abort the run.

use async_trait::async_trait;
use nexus_core::{NexusError, Result};

#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<String>;
}

/// No audio stage configured; callers should skip TTS entirely rather than
/// construct this, it exists for completeness of the trait-object surface.
pub struct NoopTtsClient;

#[async_trait]
impl TtsClient for NoopTtsClient {
    async fn synthesize(&self, _text: &str) -> Result<String> {
        Err(NexusError::TtsError { message: "tts is not configured for this deployment".into() })
    }
}

/// Deterministic client for tests: returns a fake URL derived from text length.
pub struct FakeTtsClient;

#[async_trait]
impl TtsClient for FakeTtsClient {
    async fn synthesize(&self, text: &str) -> Result<String> {
        Ok(format!("https://audio.local/fake/{}.mp3", text.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_client_always_errors() {
        let client = NoopTtsClient;
        assert_eq!(client.synthesize("hi").await.unwrap_err().code(), "TTS_ERROR");
    }

    #[tokio::test]
    async fn fake_client_returns_deterministic_url() {
        let client = FakeTtsClient;
        assert_eq!(client.synthesize("hi").await.unwrap(), client.synthesize("hi").await.unwrap());
    }
}
