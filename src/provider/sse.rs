//! A buffered, size-bounded, codepoint-safe Server-Sent-Events scanner.
//!
//! This replaces a naive "decode each HTTP chunk independently with
//! `from_utf8_lossy` and scan for `data: ` lines" approach: that approach
//! mangles multi-byte UTF-8 sequences split across chunk boundaries and has
//! no bound on how much it will buffer for a single oversized line. Here,
//! bytes are appended to a persistent buffer and only ever split on `\n`
//! (a byte that can never appear inside a multi-byte UTF-8 sequence), so a
//! codepoint is never decoded until its line is fully assembled.

use crate::error::{Error, Result};
use bytes::BytesMut;
use futures::stream::Stream;
use std::pin::Pin;

/// One complete logical SSE event: all `data:` lines between two blank
/// lines, joined by `\n` per the SSE spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub data: String,
}

impl SseEvent {
    pub fn is_done_sentinel(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Lines longer than this are a framing error rather than silently
/// truncated or endlessly buffered.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

struct ScanState {
    body: reqwest::Response,
    buf: BytesMut,
    pending_data: Vec<String>,
    finished: bool,
}

/// Wraps a streaming HTTP response body as a stream of [`SseEvent`]s.
pub fn scan(body: reqwest::Response) -> Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>> {
    let state = ScanState {
        body,
        buf: BytesMut::new(),
        pending_data: Vec::new(),
        finished: false,
    };
    Box::pin(futures::stream::unfold(state, step))
}

async fn step(mut state: ScanState) -> Option<(Result<SseEvent>, ScanState)> {
    loop {
        if state.finished {
            return None;
        }

        match extract_event(&mut state.buf, &mut state.pending_data) {
            Ok(Some(event)) => return Some((Ok(event), state)),
            Ok(None) => {}
            Err(e) => {
                state.finished = true;
                return Some((Err(e), state));
            }
        }

        match state.body.chunk().await {
            Ok(Some(bytes)) => {
                state.buf.extend_from_slice(&bytes);
                if !state.buf.contains(&b'\n') && state.buf.len() > MAX_LINE_BYTES {
                    state.finished = true;
                    return Some((
                        Err(Error::framing(format!(
                            "sse line exceeded {MAX_LINE_BYTES} bytes without a terminator"
                        ))),
                        state,
                    ));
                }
            }
            Ok(None) => {
                state.finished = true;
                // A trailing event with no final blank line is still a
                // complete event as far as the caller is concerned.
                if !state.pending_data.is_empty() {
                    let data = std::mem::take(&mut state.pending_data).join("\n");
                    return Some((Ok(SseEvent { data }), state));
                }
                return None;
            }
            Err(e) => {
                state.finished = true;
                return Some((Err(Error::Http(e)), state));
            }
        }
    }
}

/// Tries to pull one complete event out of `buf`, returning `Ok(None)` when
/// more bytes are needed.
fn extract_event(buf: &mut BytesMut, pending_data: &mut Vec<String>) -> Result<Option<SseEvent>> {
    loop {
        let Some(newline_pos) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > MAX_LINE_BYTES {
                return Err(Error::framing(format!(
                    "sse line exceeded {MAX_LINE_BYTES} bytes without a terminator"
                )));
            }
            return Ok(None);
        };
        if newline_pos > MAX_LINE_BYTES {
            return Err(Error::framing(format!(
                "sse line exceeded {MAX_LINE_BYTES} bytes"
            )));
        }

        let mut line_bytes = buf.split_to(newline_pos + 1);
        line_bytes.truncate(line_bytes.len() - 1); // drop the \n
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.truncate(line_bytes.len() - 1);
        }

        let line = String::from_utf8(line_bytes.to_vec())
            .map_err(|e| Error::framing(format!("sse line was not valid utf-8: {e}")))?;

        if line.is_empty() {
            if pending_data.is_empty() {
                continue;
            }
            let data = std::mem::take(pending_data).join("\n");
            return Ok(Some(SseEvent { data }));
        }

        if let Some(rest) = line.strip_prefix("data:") {
            pending_data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            continue;
        }

        // `event:`, `id:`, and comment lines (starting with `:`) carry no
        // payload for this core's purposes and are ignored, per the SSE
        // framing rules.
        if line.starts_with("event:") || line.starts_with("id:") || line.starts_with(':') {
            continue;
        }

        // Unrecognized field: ignore rather than fail the whole stream.
    }
}
