/// Recommendation pipeline: retrieve, compose, generate, parse.
///
/// Each request runs as one sequential pass with an explicit request-scoped
/// state value (current stage plus accumulated warnings) threaded through the
/// transitions. Nothing is shared between requests, so independent requests
/// run concurrently with no coordination.
///
/// Failure policy: retrieval failures degrade to generation without context
/// and surface as a warning; an oversized prompt skeleton, exhausted
/// generation retries, a totally unparseable output, or cancellation are the
/// only terminal failures.
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::compose::PromptComposer;
use crate::config::PipelineConfig;
use crate::error::{ConfigError, FailureReason};
use crate::generation::Generator;
use crate::model::{ComposedPrompt, RawGeneration, RecommendationSet, UserQuery, Warning};
use crate::parse::ResponseParser;
use crate::retrieval::DocumentStore;
use crate::retry::RetryPolicy;

/// Stage labels, used for tracing and to make transitions explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieving,
    Composing,
    Generating,
    Parsing,
    Done,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Retrieving => "retrieving",
            Stage::Composing => "composing",
            Stage::Generating => "generating",
            Stage::Parsing => "parsing",
            Stage::Done => "done",
        }
    }
}

/// Successful outcome: the final set plus every warning accumulated on the
/// way. Warnings never suppress a successful result.
#[derive(Debug, Clone)]
pub struct Advice {
    pub recommendations: RecommendationSet,
    pub warnings: Vec<Warning>,
}

/// Per-request state. One value per request, never ambient.
struct RequestState {
    stage: Stage,
    warnings: Vec<Warning>,
}

impl RequestState {
    fn new() -> Self {
        Self {
            stage: Stage::Retrieving,
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(
            from = self.stage.as_str(),
            to = stage.as_str(),
            "pipeline stage"
        );
        self.stage = stage;
    }

    fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn Generator>,
    composer: PromptComposer,
    parser: ResponseParser,
    retry: RetryPolicy,
    retrieval_limit: usize,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            composer: PromptComposer::new(&config),
            parser: ResponseParser::new(&config),
            retry: RetryPolicy::new(&config),
            retrieval_limit: config.retrieval_limit,
            store,
            generator,
        })
    }

    /// Run one request to completion. See `recommend_with_cancel` for the
    /// cancellable variant.
    pub async fn recommend(&self, query: &UserQuery) -> Result<Advice, FailureReason> {
        // A sender that is immediately dropped reads as "never cancelled".
        let (_tx, rx) = watch::channel(false);
        self.recommend_with_cancel(query, rx).await
    }

    /// Run one request, aborting at the next suspension point once `cancel`
    /// turns true. Cancellation yields `FailureReason::Cancelled` without
    /// issuing further external calls.
    pub async fn recommend_with_cancel(
        &self,
        query: &UserQuery,
        cancel: watch::Receiver<bool>,
    ) -> Result<Advice, FailureReason> {
        let mut state = RequestState::new();

        state.enter(Stage::Retrieving);
        let candidates = match guard(&cancel, self.store.search(&query.utterance, self.retrieval_limit)).await
        {
            None => return Err(FailureReason::Cancelled),
            Some(Ok(candidates)) => candidates,
            Some(Err(e)) => {
                // Availability over quality: continue without context.
                warn!(error = %e, "retrieval failed, degrading to generation-only");
                state.warn(Warning::RetrievalDegraded {
                    detail: e.to_string(),
                });
                Vec::new()
            }
        };

        state.enter(Stage::Composing);
        let prompt = self.composer.compose(query, &candidates)?;
        info!(
            chars = prompt.len_chars(),
            candidates = candidates.len(),
            "prompt composed"
        );

        state.enter(Stage::Generating);
        let raw = self.generate_with_retry(&prompt, &cancel).await?;

        state.enter(Stage::Parsing);
        let (set, mut parse_warnings) = self.parser.parse(&raw)?;
        state.warnings.append(&mut parse_warnings);

        state.enter(Stage::Done);
        info!(
            recommendations = set.len(),
            warnings = state.warnings.len(),
            "request complete"
        );
        Ok(Advice {
            recommendations: set,
            warnings: state.warnings,
        })
    }

    async fn generate_with_retry(
        &self,
        prompt: &ComposedPrompt,
        cancel: &watch::Receiver<bool>,
    ) -> Result<RawGeneration, FailureReason> {
        let mut attempt: u32 = 0;
        loop {
            match guard(cancel, self.generator.generate(prompt)).await {
                None => return Err(FailureReason::Cancelled),
                Some(Ok(raw)) => return Ok(raw),
                Some(Err(e)) => match self.retry.next_delay(attempt, &e) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "generation failed, retrying"
                        );
                        if guard(cancel, tokio::time::sleep(delay)).await.is_none() {
                            return Err(FailureReason::Cancelled);
                        }
                        attempt += 1;
                    }
                    None => return Err(FailureReason::GenerationExhausted { last: e }),
                },
            }
        }
    }
}

/// Resolve `fut` unless the cancel signal turns true first. Biased so a
/// request that is already cancelled never issues the call.
async fn guard<T>(cancel: &watch::Receiver<bool>, fut: impl Future<Output = T>) -> Option<T> {
    let mut cancel = cancel.clone();
    tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => None,
        value = fut => Some(value),
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling: this request can never be
            // cancelled, so park forever and let the work win the select.
            std::future::pending::<()>().await;
        }
    }
}
