//! Pluggable LLM streaming client (spec §1, §9: LLM adapter internals are
//! out of scope; this crate owns the state machine around the boundary).

use async_trait::async_trait;
use nexus_core::Result;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Streams response tokens for `prompt` given retrieved `context`.
    /// Implementations should check `should_stop` between frames so
    /// cancellation is observed promptly.
    async fn stream_tokens(
        &self,
        prompt: &str,
        context: &[String],
        sink: &mut (dyn FnMut(String) + Send),
        should_stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<String>;
}

/// Deterministic client for tests and local development: echoes the prompt
/// split into word-sized frames, prefixed by how many context chunks it saw.
pub struct FakeLlmClient;

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn stream_tokens(
        &self,
        prompt: &str,
        context: &[String],
        sink: &mut (dyn FnMut(String) + Send),
        should_stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<String> {
        let mut full = String::new();
        let preamble = format!("[ctx={}] ", context.len());
        sink(preamble.clone());
        full.push_str(&preamble);
        for word in prompt.split_whitespace() {
            if should_stop() {
                break;
            }
            let frame = format!("{word} ");
            sink(frame.clone());
            full.push_str(&frame);
        }
        Ok(full.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_streams_one_frame_per_word() {
        let client = FakeLlmClient;
        let mut frames = Vec::new();
        let text = client
            .stream_tokens("hello there friend", &["chunk-1".to_string()], &mut |t| frames.push(t), &|| false)
            .await
            .unwrap();
        assert!(text.contains("hello"));
        assert!(frames.len() >= 3);
    }

    #[tokio::test]
    async fn should_stop_halts_streaming_early() {
        let client = FakeLlmClient;
        let mut frames = Vec::new();
        client.stream_tokens("one two three four five", &[], &mut |t| frames.push(t), &|| true).await.unwrap();
        assert_eq!(frames.len(), 1);
    }
}
