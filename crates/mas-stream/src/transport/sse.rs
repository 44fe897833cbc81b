use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;

use crate::errors::TransportError;
use crate::frame::RawFrame;

use super::FrameStream;

pub(crate) type ByteStream = Pin<
    Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>,
>;

/// Incremental Server-Sent Events decoder.
///
/// Chunks may split frames anywhere; complete frames are returned as soon as
/// their terminating blank line arrives. Comment-only frames (`: ping`) are
/// keep-alives and produce nothing.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feeds a chunk and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<RawFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_sse_frame(&rest)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len() && &buf[i..i + 4] == b"\r\n\r\n" {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<RawFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(RawFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Turns a byte stream into a stream of SSE frames.
pub(crate) fn sse_frame_stream(bytes_stream: ByteStream) -> FrameStream {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<RawFrame>,
        done: bool,
    }

    Box::pin(stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(frame) = state.pending.pop_front() {
                    return Ok(Some((frame, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push_chunk(&chunk));
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        state.pending.extend(state.decoder.finish());
                        state.done = true;
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_partial_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b"data: {\"type\":\"answer_token\",\"data\":{\"text\":\"hel");
        assert!(frames.is_empty());
        let frames = decoder.push_chunk(b"lo\"}}\n\ndata: {\"type\":\"done\"}\r\n\r\n");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].data.contains("hello"));
        assert_eq!(frames[1].data, "{\"type\":\"done\"}");
    }

    #[test]
    fn ping_comments_are_not_frames() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push_chunk(b": ping\n\n").is_empty());
    }

    #[test]
    fn multi_line_data_and_event_name() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b"event: final\ndata: line one\ndata: line two\n\n");
        assert_eq!(
            frames,
            vec![RawFrame {
                event: Some("final".into()),
                data: "line one\nline two".into(),
            }]
        );
    }

    #[tokio::test]
    async fn unterminated_trailing_frame_is_flushed_at_eof() {
        let chunks: Vec<Result<bytes::Bytes, TransportError>> = vec![
            Ok(bytes::Bytes::from_static(b"data: {\"type\":\"start\"}\n\ndata: ")),
            Ok(bytes::Bytes::from_static(b"{\"type\":\"done\"}")),
        ];
        let frames: Vec<_> = sse_frame_stream(Box::pin(stream::iter(chunks)))
            .collect::<Vec<_>>()
            .await;
        let data: Vec<String> = frames
            .into_iter()
            .map(|f| f.expect("frame").data)
            .collect();
        assert_eq!(data, vec!["{\"type\":\"start\"}", "{\"type\":\"done\"}"]);
    }

    #[tokio::test]
    async fn read_errors_end_the_stream() {
        let chunks: Vec<Result<bytes::Bytes, TransportError>> =
            vec![Err(TransportError::offline("reset"))];
        let mut frames = sse_frame_stream(Box::pin(stream::iter(chunks)));
        assert!(matches!(
            frames.next().await,
            Some(Err(TransportError::Offline { .. }))
        ));
        assert!(frames.next().await.is_none());
    }
}
