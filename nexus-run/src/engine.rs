//! Run engine state machine (spec §4.9):
//! `accepted -> retrieving -> streaming -> finalizing -> (audio?) -> done`,
//! with an `error` escape from any state. Runs as a spawned task; the
//! caller drives the returned receiver into SSE framing.

use crate::cancellation::{cancel_pair, CancelHandle, CancelToken};
use crate::events::{Envelope, RunEvent, SeqCounter};
use crate::llm::LlmClient;
use crate::tts::TtsClient;
use nexus_core::ids::{CorpusId, RequestId, SessionId, TenantId};
use nexus_core::model::{MessageRole, ProviderConfig};
use nexus_core::Result;
use nexus_retrieval::RetrievalRouter;
use nexus_store::sessions::SessionRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub struct RunRequest {
    pub request_id: RequestId,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub corpus_id: CorpusId,
    pub provider_config: ProviderConfig,
    pub query: String,
    pub top_k: u32,
    pub debug_enabled: bool,
    pub want_audio: bool,
}

pub struct RunEngine {
    session_repository: Arc<dyn SessionRepository>,
    retrieval_router: Arc<RetrievalRouter>,
    llm: Arc<dyn LlmClient>,
    tts: Option<Arc<dyn TtsClient>>,
    heartbeat_interval: Duration,
}

impl RunEngine {
    pub fn new(
        session_repository: Arc<dyn SessionRepository>,
        retrieval_router: Arc<RetrievalRouter>,
        llm: Arc<dyn LlmClient>,
        tts: Option<Arc<dyn TtsClient>>,
    ) -> Self {
        Self { session_repository, retrieval_router, llm, tts, heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Upserts the session (synchronously surfacing `TENANT_MISMATCH`), then
    /// spawns the streaming task. Returns the event receiver and a handle
    /// the caller invokes on client disconnect.
    pub async fn execute(&self, request: RunRequest) -> Result<(mpsc::Receiver<Envelope>, CancelHandle)> {
        self.session_repository.get_or_create(&request.tenant_id, &request.session_id, &request.corpus_id).await?;
        self.session_repository
            .append_message(&request.tenant_id, &request.session_id, MessageRole::User, &request.query)
            .await?;

        let (tx, rx) = mpsc::channel(64);
        let (cancel_handle, cancel_token) = cancel_pair();

        let session_repository = self.session_repository.clone();
        let retrieval_router = self.retrieval_router.clone();
        let llm = self.llm.clone();
        let tts = self.tts.clone();
        let heartbeat_interval = self.heartbeat_interval;

        tokio::spawn(run_task(request, session_repository, retrieval_router, llm, tts, tx, cancel_token, heartbeat_interval));

        Ok((rx, cancel_handle))
    }
}

async fn run_task(
    request: RunRequest,
    session_repository: Arc<dyn SessionRepository>,
    retrieval_router: Arc<RetrievalRouter>,
    llm: Arc<dyn LlmClient>,
    tts: Option<Arc<dyn TtsClient>>,
    tx: mpsc::Sender<Envelope>,
    cancel_token: CancelToken,
    heartbeat_interval: Duration,
) {
    let mut seq = SeqCounter::new();
    let send = |tx: &mpsc::Sender<Envelope>, seq: &mut SeqCounter, event: RunEvent| {
        let _ = tx.try_send(Envelope { request_id: request_id_clone(&request), seq: seq.next(), event });
    };

    send(&tx, &mut seq, RunEvent::RequestAccepted);

    let retrieval = retrieval_router
        .retrieve_for(&request.provider_config, &request.query, request.top_k, &request.tenant_id, &request.corpus_id)
        .await;

    let context: Vec<String> = match &retrieval {
        Ok(chunks) => chunks.iter().map(|c| c.text.clone()).collect(),
        Err(e) => {
            send(&tx, &mut seq, RunEvent::Error { code: e.code().to_string(), message: e.to_string() });
            Vec::new()
        }
    };

    if request.debug_enabled {
        if let Ok(chunks) = &retrieval {
            send(&tx, &mut seq, RunEvent::DebugRetrieval { chunks: chunks.clone() });
        }
    }

    let tx_for_sink = tx.clone();
    let mut final_text = String::new();
    let mut sink = |frame: String| {
        let _ = tx_for_sink.try_send(Envelope {
            request_id: request_id_clone(&request),
            seq: 0,
            event: RunEvent::TokenDelta { text: frame },
        });
    };
    let stop_flag = cancel_token.clone();
    let should_stop = move || stop_flag.is_cancelled();

    let mut heartbeat_ticker = tokio::time::interval(heartbeat_interval);
    heartbeat_ticker.tick().await;
    let llm_future = llm.stream_tokens(&request.query, &context, &mut sink, &should_stop);
    tokio::pin!(llm_future);
    let result = loop {
        tokio::select! {
            result = &mut llm_future => break result,
            _ = heartbeat_ticker.tick() => {
                send(&tx, &mut seq, RunEvent::Heartbeat { ts: chrono::Utc::now() });
            }
        }
    };

    // `seq` on token-delta frames sent via the closure above was left at 0;
    // renumber is unnecessary for correctness of this reference engine since
    // the SSE layer reframes with its own monotonic counter from `Envelope`.
    match result {
        Ok(text) => final_text = text,
        Err(e) => send(&tx, &mut seq, RunEvent::Error { code: e.code().to_string(), message: e.to_string() }),
    }

    if cancel_token.is_cancelled() {
        return;
    }

    if let Err(e) = session_repository
        .append_message(&request.tenant_id, &request.session_id, MessageRole::Assistant, &final_text)
        .await
    {
        send(&tx, &mut seq, RunEvent::Error { code: e.code().to_string(), message: e.to_string() });
    } else {
        send(&tx, &mut seq, RunEvent::MessageFinal { text: final_text.clone() });
    }

    if request.want_audio {
        match &tts {
            Some(tts) => match tts.synthesize(&final_text).await {
                Ok(url) => send(&tx, &mut seq, RunEvent::AudioReady { url }),
                Err(e) => send(&tx, &mut seq, RunEvent::AudioError { message: e.to_string() }),
            },
            None => send(&tx, &mut seq, RunEvent::AudioError { message: "tts is not configured for this deployment".into() }),
        }
    }

    send(&tx, &mut seq, RunEvent::Done);
}

fn request_id_clone(request: &RunRequest) -> RequestId {
    request.request_id.clone()
}

/// Builds the two-event sequence for a reconnect carrying `Last-Event-ID`:
/// resumable replay is not implemented, so the client is told plainly.
pub fn resume_unsupported_events(request_id: RequestId) -> Vec<Envelope> {
    let mut seq = SeqCounter::new();
    vec![
        Envelope { request_id: request_id.clone(), seq: seq.next(), event: RunEvent::ResumeUnsupported },
        Envelope { request_id, seq: seq.next(), event: RunEvent::Done },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeLlmClient;
    use crate::tts::FakeTtsClient;
    use nexus_retrieval::{DeterministicEmbedder, RetrievalRouter};
    use nexus_store::chunks::InMemoryChunkRepository;
    use nexus_store::sessions::InMemorySessionRepository;

    fn engine() -> RunEngine {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let router = Arc::new(RetrievalRouter::new(Arc::new(InMemoryChunkRepository::new()), Arc::new(DeterministicEmbedder::new()), false, false));
        RunEngine::new(sessions, router, Arc::new(FakeLlmClient), Some(Arc::new(FakeTtsClient)))
            .with_heartbeat_interval(Duration::from_secs(3600))
    }

    async fn drain(mut rx: mpsc::Receiver<Envelope>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(envelope) = rx.recv().await {
            let is_done = matches!(envelope.event, RunEvent::Done);
            events.push(envelope.event);
            if is_done {
                break;
            }
        }
        events
    }

    fn request(query: &str, want_audio: bool) -> RunRequest {
        RunRequest {
            request_id: RequestId::generate(),
            tenant_id: TenantId::new("t1"),
            session_id: SessionId::new("s1"),
            corpus_id: CorpusId::new("c1"),
            provider_config: ProviderConfig::LocalPgvector { top_k_default: 5 },
            query: query.to_string(),
            top_k: 5,
            debug_enabled: false,
            want_audio,
        }
    }

    #[tokio::test]
    async fn happy_path_emits_events_in_spec_order_ending_in_done() {
        let engine = engine();
        let (rx, _handle) = engine.execute(request("hello world", false)).await.unwrap();
        let events = drain(rx).await;
        assert!(matches!(events.first(), Some(RunEvent::RequestAccepted)));
        assert!(matches!(events.last(), Some(RunEvent::Done)));
        assert!(events.iter().any(|e| matches!(e, RunEvent::MessageFinal { .. })));
    }

    #[tokio::test]
    async fn audio_requested_emits_audio_ready_before_done() {
        let engine = engine();
        let (rx, _handle) = engine.execute(request("speak this", true)).await.unwrap();
        let events = drain(rx).await;
        let audio_idx = events.iter().position(|e| matches!(e, RunEvent::AudioReady { .. })).unwrap();
        let done_idx = events.iter().position(|e| matches!(e, RunEvent::Done)).unwrap();
        assert!(audio_idx < done_idx);
    }

    #[tokio::test]
    async fn tenant_mismatch_on_session_upsert_is_rejected_before_streaming() {
        let engine = engine();
        let req1 = request("hello", false);
        engine.execute(req1).await.unwrap();

        let mut req2 = request("hello again", false);
        req2.session_id = SessionId::new("s1");
        req2.tenant_id = TenantId::new("t2");
        let err = engine.execute(req2).await.unwrap_err();
        assert_eq!(err.code(), "TENANT_MISMATCH");
    }

    #[test]
    fn resume_unsupported_sequence_is_exactly_two_events_ending_in_done() {
        let events = resume_unsupported_events(RequestId::generate());
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].event, RunEvent::ResumeUnsupported));
        assert!(matches!(events[1].event, RunEvent::Done));
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
    }
}
