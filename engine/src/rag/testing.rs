//! Scripted collaborators for exercising the loop without a network
//!
//! Both fakes count their calls and record what they were asked, so tests can
//! assert on call counts, query order and prompt contents.

use async_trait::async_trait;
use sdk::{DocumentStore, EngineError, GenerationModel, RetrievedDocument};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ErrorFactory = Arc<dyn Fn() -> EngineError + Send + Sync>;
type Responder = Arc<dyn Fn(&str, usize) -> String + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Document store answering from a fixed query table
#[derive(Clone, Default)]
pub struct ScriptedStore {
    responses: HashMap<String, Vec<String>>,
    fallback: Vec<String>,
    fail_first: usize,
    error: Option<ErrorFactory>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<String>>>,
    last_k: Arc<Mutex<Option<usize>>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `texts` whenever the query is exactly `query`
    pub fn with(mut self, query: &str, texts: &[&str]) -> Self {
        self.responses.insert(
            query.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Return `texts` for any query without its own entry
    pub fn with_fallback(mut self, texts: &[&str]) -> Self {
        self.fallback = texts.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Fail the first `n` calls with a retrieval error
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        if self.error.is_none() {
            self.error = Some(Arc::new(|| EngineError::Retrieval("store unavailable".into())));
        }
        self
    }

    /// Fail every call with a retrieval error
    pub fn failing_always(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// Fail every call with a custom error
    pub fn failing_with(mut self, error: fn() -> EngineError) -> Self {
        self.error = Some(Arc::new(error));
        self.fail_first = usize::MAX;
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every query received, in order
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn last_k(&self) -> Option<usize> {
        *lock(&self.last_k)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queries).push(query.to_string());
        *lock(&self.last_k) = Some(k);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call < self.fail_first {
            if let Some(error) = &self.error {
                return Err(error());
            }
        }

        let texts = self.responses.get(query).unwrap_or(&self.fallback);
        Ok(texts
            .iter()
            .take(k)
            .map(|t| RetrievedDocument::new(t.clone()))
            .collect())
    }
}

/// Generation model answering through a closure of (prompt, call index)
#[derive(Clone)]
pub struct ScriptedModel {
    responder: Responder,
    fail_first: usize,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str, usize) -> String + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            fail_first: 0,
            fail_after: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `text`
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::from_fn(move |_, _| text.clone())
    }

    /// Fail the first `n` calls with a generation error
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn failing_always(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// Answer the first `n` calls, then fail every later one
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl GenerationModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call < self.fail_first || self.fail_after.is_some_and(|n| call >= n) {
            return Err(EngineError::Generation("model unavailable".into()));
        }

        Ok((self.responder)(prompt, call))
    }
}
