//! Server-sent event plumbing shared by the HTTP providers.
//!
//! A provider supplies a [`StreamDecoder`] that turns single SSE lines into
//! text fragments; [`fragment_stream`] drives the HTTP body through it and
//! settles the throttle lease once the stream ends.

use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::completion::FragmentStream;
use crate::error::{ConnectorError, Result};
use crate::throttle::Lease;

/// Line-oriented decoder for one provider's streaming format.
pub trait StreamDecoder: Send {
    /// Feed one line (without its trailing newline).  Returns the text
    /// fragment carried by the line, if any.
    fn feed_line(&mut self, line: &str) -> Result<Option<String>>;

    /// Whether the terminal event has been seen.
    fn is_done(&self) -> bool;

    /// Total tokens reported by the provider, once known.
    fn usage(&self) -> Option<u64>;
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

enum State<F, D> {
    Opening(F, D),
    Reading(Reader<D>),
    Done,
}

struct Reader<D> {
    bytes: ByteStream,
    buffer: Vec<u8>,
    decoder: D,
    lease: Option<Lease>,
    eof: bool,
    finished: bool,
}

impl<D: StreamDecoder> Reader<D> {
    fn new(resp: reqwest::Response, lease: Lease, decoder: D) -> Self {
        let bytes = resp.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Self {
            bytes: Box::pin(bytes),
            buffer: Vec::new(),
            decoder,
            lease: Some(lease),
            eof: false,
            finished: false,
        }
    }

    async fn next_fragment(&mut self) -> Option<Result<String>> {
        loop {
            if self.finished {
                self.settle();
                return None;
            }

            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = match String::from_utf8(raw) {
                    Ok(line) => line,
                    Err(e) => {
                        return Some(Err(ConnectorError::Stream {
                            reason: format!("invalid UTF-8 in stream: {e}"),
                        }));
                    }
                };
                let fragment = self.decoder.feed_line(line.trim_end_matches(['\r', '\n']));
                if self.decoder.is_done() {
                    self.finished = true;
                }
                match fragment {
                    Ok(Some(text)) if !text.is_empty() => return Some(Ok(text)),
                    Ok(_) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }

            if self.eof {
                self.finished = true;
                continue;
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    return Some(Err(ConnectorError::Stream {
                        reason: format!("stream read error: {e}"),
                    }));
                }
                None => {
                    self.eof = true;
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }

    fn settle(&mut self) {
        if let Some(lease) = self.lease.take() {
            let actual = self.decoder.usage().unwrap_or_else(|| lease.estimate());
            lease.settle(actual);
        }
    }
}

/// Build a fragment stream from a request that has not been sent yet.
///
/// `open` performs admission and sends the request; nothing happens until the
/// stream is first polled.  Dropping the stream early releases the
/// concurrency slot without crediting unused tokens.
pub(crate) fn fragment_stream<F, D>(open: F, decoder: D) -> FragmentStream
where
    F: Future<Output = Result<(reqwest::Response, Lease)>> + Send + 'static,
    D: StreamDecoder + 'static,
{
    let stream = futures::stream::unfold(State::Opening(open, decoder), |state| async move {
        let mut reader = match state {
            State::Opening(open, decoder) => match open.await {
                Ok((resp, lease)) => Reader::new(resp, lease, decoder),
                Err(e) => return Some((Err(e), State::Done)),
            },
            State::Reading(reader) => reader,
            State::Done => return None,
        };
        match reader.next_fragment().await {
            Some(Ok(text)) => Some((Ok(text), State::Reading(reader))),
            Some(Err(e)) => Some((Err(e), State::Done)),
            None => None,
        }
    });
    Box::pin(stream)
}

/// Strip the `data:` field prefix from an SSE line.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
