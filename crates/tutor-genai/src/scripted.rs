//! Deterministic in-memory backend.
//!
//! [`ScriptedBackend`] replays queued responses in order and records every
//! prompt it receives. It lets callers exercise the full course workflow
//! without network access, including streams that fail part-way or stay open
//! until explicitly released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture};
use futures::stream::{self, StreamExt};

use crate::{GenAiError, GenerationBackend, Result, TextStream};

/// A scripted streamed response.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    items: Vec<std::result::Result<String, String>>,
    open_error: Option<String>,
    hold: Option<oneshot::Receiver<()>>,
}

/// Releases a held [`ScriptedStream`], letting it reach end-of-stream.
#[derive(Debug)]
pub struct StreamRelease(oneshot::Sender<()>);

impl StreamRelease {
    /// Lets the held stream finish.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

impl ScriptedStream {
    /// A stream yielding `fragments` and then ending normally.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: fragments.into_iter().map(|s| Ok(s.into())).collect(),
            ..Self::default()
        }
    }

    /// A stream yielding `fragments` and then failing with `message`.
    pub fn failing_after<I, S>(fragments: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scripted = Self::fragments(fragments);
        scripted.items.push(Err(message.into()));
        scripted
    }

    /// A stream whose opening request is rejected with `message`.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            open_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Keeps the stream open after its last item until the returned handle
    /// is released or dropped.
    #[must_use]
    pub fn held(mut self) -> (Self, StreamRelease) {
        let (sender, receiver) = oneshot::channel();
        self.hold = Some(receiver);
        (self, StreamRelease(sender))
    }

    fn into_stream(self) -> Result<TextStream> {
        if let Some(message) = self.open_error {
            return Err(GenAiError::Service(message));
        }

        let items = stream::iter(
            self.items
                .into_iter()
                .map(|item| item.map_err(GenAiError::Service)),
        );
        let hold = self.hold;
        let tail = stream::once(async move {
            if let Some(receiver) = hold {
                let _ = receiver.await;
            }
        })
        .filter_map(|()| future::ready(None::<Result<String>>));

        Ok(items.chain(tail).boxed())
    }
}

/// A [`GenerationBackend`] that replays queued responses.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    structured: Mutex<VecDeque<std::result::Result<String, String>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    prompts: Mutex<Vec<String>>,
    structured_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedBackend {
    /// Creates a backend with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful structured response.
    pub fn push_structured(&self, text: impl Into<String>) {
        lock(&self.structured).push_back(Ok(text.into()));
    }

    /// Queues a failed structured response.
    pub fn fail_structured(&self, message: impl Into<String>) {
        lock(&self.structured).push_back(Err(message.into()));
    }

    /// Queues a streamed response.
    pub fn push_stream(&self, stream: ScriptedStream) {
        lock(&self.streams).push_back(stream);
    }

    /// Number of structured requests received so far.
    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    /// Number of stream requests received so far.
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _schema: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<String>> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        let reply = lock(&self.structured).pop_front();

        Box::pin(future::ready(match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(GenAiError::Service(message)),
            None => Err(GenAiError::NotConfigured(
                "no scripted structured response queued".to_string(),
            )),
        }))
    }

    fn generate_stream<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<TextStream>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        let scripted = lock(&self.streams).pop_front();

        Box::pin(future::ready(scripted.map_or_else(
            || {
                Err(GenAiError::NotConfigured(
                    "no scripted stream queued".to_string(),
                ))
            },
            ScriptedStream::into_stream,
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn drain(backend: &ScriptedBackend) -> Vec<Result<String>> {
        backend
            .generate_stream("prompt")
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_structured_replies_in_order() {
        let backend = ScriptedBackend::new();
        backend.push_structured("{\"a\":1}");
        backend.fail_structured("boom");

        let schema = serde_json::json!({});
        assert_eq!(backend.generate("one", &schema).await.unwrap(), "{\"a\":1}");
        assert!(matches!(
            backend.generate("two", &schema).await,
            Err(GenAiError::Service(_))
        ));
        assert!(matches!(
            backend.generate("three", &schema).await,
            Err(GenAiError::NotConfigured(_))
        ));
        assert_eq!(backend.structured_calls(), 3);
        assert_eq!(backend.prompts(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_stream_fragments_then_failure() {
        let backend = ScriptedBackend::new();
        backend.push_stream(ScriptedStream::failing_after(["a", "b"], "cut off"));

        let items = drain(&backend).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert_eq!(items[1].as_ref().unwrap(), "b");
        assert!(items[2].is_err());
        assert_eq!(backend.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_stream() {
        let backend = ScriptedBackend::new();
        backend.push_stream(ScriptedStream::rejected("quota"));
        assert!(backend.generate_stream("p").await.is_err());
    }

    #[tokio::test]
    async fn test_held_stream_waits_for_release() {
        let backend = ScriptedBackend::new();
        let (scripted, release) = ScriptedStream::fragments(["x"]).held();
        backend.push_stream(scripted);

        let mut stream = backend.generate_stream("p").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "x");

        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), stream.next());
        assert!(pending.await.is_err(), "stream should still be open");

        release.release();
        assert!(stream.next().await.is_none());
    }
}
