//! Lazily issued completions.
//!
//! A [`Completion`] is a handle to a request that has not been sent yet.
//! Nothing is admitted by the throttle or written to the network until the
//! handle is consumed, either whole with [`Completion::text`] or
//! incrementally with [`Completion::into_stream`].

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt, stream};

use crate::error::{ConnectorError, Result};

/// Incremental text fragments of a completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The provider side of a [`Completion`].
#[async_trait]
pub trait CompletionSource: Send {
    /// Issue the request and return the whole response text.
    async fn text(self: Box<Self>) -> Result<String>;

    /// Issue the request as a stream.  Nothing happens until the stream is
    /// first polled.
    fn stream(self: Box<Self>) -> FragmentStream;
}

/// A not-yet-issued completion request.
pub struct Completion {
    source: Box<dyn CompletionSource>,
}

impl Completion {
    pub fn new(source: impl CompletionSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// A completion that yields `text` without contacting anything.
    pub fn ready(text: impl Into<String>) -> Self {
        Self::from_fragments([text.into()])
    }

    /// A completion that yields the given fragments in order.
    pub fn from_fragments(fragments: impl IntoIterator<Item = String>) -> Self {
        Self::new(Fixed(Ok(fragments.into_iter().collect())))
    }

    /// A completion that fails with `error` when consumed.
    pub fn failed(error: ConnectorError) -> Self {
        Self::new(Fixed(Err(error)))
    }

    /// Wait for the full response text.
    pub async fn text(self) -> Result<String> {
        self.source.text().await
    }

    /// Consume the completion as a stream of text fragments.
    pub fn into_stream(self) -> FragmentStream {
        self.source.stream()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// Concatenate a fragment stream into one string.
pub async fn collect_text(stream: FragmentStream) -> Result<String> {
    stream.try_collect::<Vec<String>>().await.map(|parts| parts.concat())
}

// ---------------------------------------------------------------------------
// Fixed responses
// ---------------------------------------------------------------------------

struct Fixed(Result<Vec<String>>);

#[async_trait]
impl CompletionSource for Fixed {
    async fn text(self: Box<Self>) -> Result<String> {
        self.0.map(|parts| parts.concat())
    }

    fn stream(self: Box<Self>) -> FragmentStream {
        match self.0 {
            Ok(parts) => stream::iter(parts.into_iter().map(Ok)).boxed(),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }
}
