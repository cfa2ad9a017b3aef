//! Frames a `nexus_run::Envelope` stream as real SSE (spec §4.9, §6, §8).
//!
//! `nexus-run`'s own `Envelope.seq` is an internal detail of its streaming
//! task (token-delta frames carry a placeholder `seq: 0`); the wire format's
//! contiguous 1-based `seq` is this module's own counter, incremented once
//! per frame actually written.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use nexus_run::{CancelHandle, Envelope as RunEnvelope};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;

/// Cancels the run's streaming task when the SSE body future is dropped,
/// which happens as soon as axum notices the client disconnected.
struct CancelOnDrop(Option<CancelHandle>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}

pub fn stream_run(mut receiver: mpsc::Receiver<RunEnvelope>, cancel_handle: CancelHandle) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let body = async_stream::stream! {
        let _guard = CancelOnDrop(Some(cancel_handle));
        let mut seq: u64 = 0;
        while let Some(envelope) = receiver.recv().await {
            seq += 1;
            let wire = serde_json::json!({
                "request_id": envelope.request_id,
                "seq": seq,
                "event": envelope.event,
            });
            let data = serde_json::to_string(&wire).unwrap_or_else(|_| "{}".to_string());
            yield Ok(Event::default().event(envelope.event.name()).id(seq.to_string()).data(data));
        }
    };

    Sse::new(body).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("heartbeat"))
}
