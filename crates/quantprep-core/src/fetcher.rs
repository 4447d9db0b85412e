//! Stream fetcher: one streaming generation call per question.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, warn};

use crate::config::ModelIds;
use crate::error::Result;
use crate::parser::parse;
use crate::prompt::{build_prompt, request_id};
use crate::question::PartialQuestion;
use crate::request::GenerationRequest;
use crate::service::GenerationService;

/// Fetches single questions from a [`GenerationService`].
#[derive(Clone)]
pub struct StreamFetcher {
    service: Arc<dyn GenerationService>,
    models: ModelIds,
}

impl std::fmt::Debug for StreamFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFetcher")
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

impl StreamFetcher {
    /// Creates a fetcher over `service` using `models` to resolve tiers.
    pub fn new(service: Arc<dyn GenerationService>, models: ModelIds) -> Self {
        Self { service, models }
    }

    /// Streams one question.
    ///
    /// Every received chunk is appended to the accumulated text, the text is
    /// re-parsed, and `on_partial` is called with the full current value. On
    /// success the final parsed value is returned. Failures are logged and
    /// returned; partial updates already delivered are not retracted.
    pub async fn fetch_streaming<F>(
        &self,
        request: &GenerationRequest,
        mut on_partial: F,
    ) -> Result<PartialQuestion>
    where
        F: FnMut(PartialQuestion) + Send,
    {
        let id = request_id();
        let prompt = build_prompt(request, &id);
        let model_id = self.models.id_for(request.model);

        let result = self.stream_once(model_id, &prompt, &mut on_partial).await;
        match &result {
            Ok(q) => {
                debug!(request_id = %id, model = model_id, has_title = q.has_title(), "stream complete");
            }
            Err(e) if e.is_transient() => {
                warn!(request_id = %id, model = model_id, error = %e, "question stream failed");
            }
            Err(e) => {
                error!(request_id = %id, model = model_id, error = %e, "question stream rejected");
            }
        }
        result
    }

    async fn stream_once<F>(
        &self,
        model_id: &str,
        prompt: &str,
        on_partial: &mut F,
    ) -> Result<PartialQuestion>
    where
        F: FnMut(PartialQuestion) + Send,
    {
        let mut chunks = self.service.stream(model_id, prompt).await?;
        let mut text = String::new();
        let mut latest = parse("");

        while let Some(chunk) = chunks.next().await {
            text.push_str(&chunk?);
            latest = parse(&text);
            on_partial(latest.clone());
        }
        Ok(latest)
    }
}
