//! Server-Sent Events stream handling for streaming skill invocations.
//!
//! Parses SSE frames from an HTTP response into typed [`InvocationEvent`]s,
//! consumed as an async iterator rather than via callbacks. Dropping the
//! stream cancels the background parser.
//!
//! Wire contract:
//! - `event: start` — must carry `data.status`
//! - `event: complete` / `event: task_complete` — must carry `data.result`
//!   or `data.status`
//! - `event: error` — must carry `data.error`

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Result, SuperAgentError};

pub use super::jsonrpc::InvocationEvent;

/// A stream of invocation events from a remote agent.
///
/// Ends (`next()` returns `None`) when the server closes the connection.
/// Transport and parse failures surface as `Some(Err(…))` items; dropping
/// the stream stops the background parser.
pub struct EventStream {
    receiver: mpsc::Receiver<Result<InvocationEvent>>,
    /// Background parse task — kept so it runs to completion.
    _task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl EventStream {
    /// Create an `EventStream` from a raw `reqwest::Response`.
    ///
    /// Spawns a background task that reads the body as SSE frames and sends
    /// parsed events through a channel.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            if let Err(e) = parse_event_stream(response, &tx).await {
                // Deliver the terminal error; ignore send failures (the
                // receiver may already be gone).
                let _ = tx.send(Err(e)).await;
            }
        });

        Self {
            receiver: rx,
            _task: task,
        }
    }

    /// Build a stream from pre-canned events.
    #[cfg(test)]
    pub(crate) fn from_events(events: Vec<Result<InvocationEvent>>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Self {
            receiver: rx,
            _task: task,
        }
    }

    /// Get the next event. `None` means the server closed the stream.
    pub async fn next(&mut self) -> Option<Result<InvocationEvent>> {
        self.receiver.recv().await
    }

    /// Convert into a `futures::Stream` of events.
    pub fn into_stream(self) -> EventStreamAdapter {
        EventStreamAdapter {
            receiver: self.receiver,
            _task: self._task,
        }
    }
}

/// `futures::Stream` adapter created by [`EventStream::into_stream`].
pub struct EventStreamAdapter {
    receiver: mpsc::Receiver<Result<InvocationEvent>>,
    _task: tokio::task::JoinHandle<()>,
}

impl Stream for EventStreamAdapter {
    type Item = Result<InvocationEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Read the response body as SSE frames, sending parsed events to `tx`.
async fn parse_event_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<Result<InvocationEvent>>,
) -> Result<()> {
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut pending: Vec<u8> = Vec::new();
    let mut buffer = String::new();
    let mut frame = SseFrame::default();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| SuperAgentError::network(format!("error reading SSE stream: {e}")))?;

        pending.extend_from_slice(&chunk);
        buffer.push_str(&decode_complete_utf8(&mut pending)?);

        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer = buffer[newline_pos + 1..].to_string();

            if line.is_empty() {
                // Frame boundary.
                if let Some(parsed) = frame.finish() {
                    if tx.send(parsed).await.is_err() {
                        // Receiver dropped — stop parsing.
                        return Ok(());
                    }
                }
                frame = SseFrame::default();
            } else {
                frame.feed(&line);
            }
        }
    }

    if !pending.is_empty() {
        return Err(SuperAgentError::network(
            "SSE stream ended mid UTF-8 sequence".to_string(),
        ));
    }

    // Flush a final frame that had no trailing blank line.
    if let Some(parsed) = frame.finish() {
        let _ = tx.send(parsed).await;
    }

    Ok(())
}

/// Drain the longest complete UTF-8 prefix from `pending`, leaving any
/// partial trailing sequence in place for the next chunk. Chunk boundaries
/// are arbitrary, so a multibyte character may arrive split in two.
fn decode_complete_utf8(pending: &mut Vec<u8>) -> Result<String> {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            Ok(text)
        }
        Err(err) if err.error_len().is_none() => {
            let rest = pending.split_off(err.valid_up_to());
            let prefix = std::mem::replace(pending, rest);
            String::from_utf8(prefix)
                .map_err(|e| SuperAgentError::network(format!("invalid UTF-8 in SSE stream: {e}")))
        }
        Err(err) => Err(SuperAgentError::network(format!(
            "invalid UTF-8 in SSE stream: {err}"
        ))),
    }
}

/// One SSE frame being accumulated: an optional `event:` name and one or
/// more `data:` lines.
#[derive(Default)]
struct SseFrame {
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrame {
    fn feed(&mut self, line: &str) {
        // Comments (lines starting with ':') are keep-alive signals.
        if line.starts_with(':') {
            return;
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.event = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.trim().to_string());
        }
        // Other fields (id:, retry:) are ignored.
    }

    fn finish(self) -> Option<Result<InvocationEvent>> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let data = self.data.join("\n");
        if data.is_empty() || data == "[DONE]" {
            return None;
        }
        Some(parse_event(self.event.as_deref().unwrap_or(""), &data))
    }
}

/// Parse one complete frame into a typed event.
fn parse_event(event: &str, data: &str) -> Result<InvocationEvent> {
    let value: Value = serde_json::from_str(data).map_err(|e| {
        SuperAgentError::InvalidJson(format!("failed to parse SSE event data: {e} (data: {data})"))
    })?;

    match event {
        "start" => {
            let status = value
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SuperAgentError::InvalidJson(format!(
                        "start event missing 'status': {data}"
                    ))
                })?
                .to_string();
            Ok(InvocationEvent::Start { status })
        }
        "complete" | "task_complete" => {
            let result = value.get("result").cloned();
            let status = value
                .get("status")
                .and_then(Value::as_str)
                .map(String::from);
            if result.is_none() && status.is_none() {
                return Err(SuperAgentError::InvalidJson(format!(
                    "complete event missing 'result' and 'status': {data}"
                )));
            }
            Ok(InvocationEvent::Complete { result, status })
        }
        "error" => {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SuperAgentError::InvalidJson(format!("error event missing 'error': {data}"))
                })?
                .to_string();
            Ok(InvocationEvent::Error { message })
        }
        other => Err(SuperAgentError::InvalidJson(format!(
            "unknown SSE event type '{other}' (data: {data})"
        ))),
    }
}
