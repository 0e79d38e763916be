use serde::Serialize;
use std::sync::Arc;

use crate::client_id::{ClientContext, ClientIdResolver};
use crate::error::{Error, Result};
use crate::generation::ReplyGenerator;
use crate::metrics::{MetricsCollector, Outcome};
use crate::prompt::PromptBuilder;
use crate::request::GenerationRequest;
use crate::usage_tracker::{UsageSnapshot, UsageTracker};

/// A drafted reply and the caller's usage after the call was charged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedReply {
    pub reply: String,
    pub tone: String,
    pub client_id: String,
    pub usage: UsageSnapshot,
}

/// Admission check on its own, for callers that meter something other than
/// generation.
#[derive(Debug, Clone)]
pub struct ClientUsage {
    pub client_id: String,
    pub usage: UsageSnapshot,
}

/// Gates generation requests on the daily quota and drives the provider.
#[derive(Clone)]
pub struct ReplyService {
    resolver: ClientIdResolver,
    tracker: Arc<UsageTracker>,
    generator: Arc<dyn ReplyGenerator>,
    prompt_builder: PromptBuilder,
    metrics: MetricsCollector,
}

impl ReplyService {
    pub fn new(
        resolver: ClientIdResolver,
        tracker: Arc<UsageTracker>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            resolver,
            tracker,
            generator,
            prompt_builder: PromptBuilder::new(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn is_provider_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn client_id(&self, context: &ClientContext) -> String {
        self.resolver.resolve_context(context)
    }

    /// Quota check, validation, charge, then one provider call.
    ///
    /// An exhausted quota short-circuits before the prompt is built. A
    /// request that passes validation is charged even when the provider
    /// call fails.
    pub async fn generate_reply(
        &self,
        context: &ClientContext,
        request: GenerationRequest,
    ) -> Result<GeneratedReply> {
        self.generate_reply_for(self.client_id(context), request).await
    }

    /// [`generate_reply`](Self::generate_reply) for an already resolved identifier.
    pub async fn generate_reply_for(
        &self,
        client_id: String,
        request: GenerationRequest,
    ) -> Result<GeneratedReply> {
        if !self.tracker.is_allowed(&client_id) {
            return Err(self.throttled(&client_id, self.tracker.usage_info(&client_id)).await);
        }

        if let Err(err) = request.check() {
            tracing::debug!(client_id = %client_id, error = %err, "Rejected invalid request");
            self.metrics.record(Outcome::Rejected).await;
            return Err(err);
        }

        // Check and charge again in one step; a parallel request may have
        // used the last call since the check above.
        let charged = match self.tracker.try_record_usage(&client_id) {
            Ok(usage) => usage,
            Err(usage) => return Err(self.throttled(&client_id, usage).await),
        };
        let tone = request.effective_tone();
        let prompt = self.prompt_builder.build(&request);

        tracing::info!(
            client_id = %client_id,
            tone = %tone,
            remaining = charged.remaining_calls,
            "Generating reply"
        );

        let text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                self.metrics.record(Outcome::Failed).await;
                return Err(err.into());
            }
        };

        let reply = text.trim();
        if reply.is_empty() {
            self.metrics.record(Outcome::Failed).await;
            return Err(Error::EmptyReply);
        }

        self.metrics.record(Outcome::Generated).await;
        Ok(GeneratedReply {
            reply: reply.to_string(),
            tone,
            usage: self.tracker.usage_info(&client_id),
            client_id,
        })
    }

    async fn throttled(&self, client_id: &str, usage: UsageSnapshot) -> Error {
        tracing::warn!(client_id = %client_id, max_calls = usage.max_calls, "Daily limit reached");
        self.metrics.record(Outcome::Throttled).await;
        Error::QuotaExceeded(usage)
    }

    /// Current usage for the caller. Never consumes quota.
    pub fn usage_for(&self, context: &ClientContext) -> ClientUsage {
        self.usage_of(self.client_id(context))
    }

    pub fn usage_of(&self, client_id: String) -> ClientUsage {
        let usage = self.tracker.usage_info(&client_id);
        ClientUsage { client_id, usage }
    }

    /// Charge one call without generating anything.
    pub fn consume(&self, context: &ClientContext) -> Result<ClientUsage> {
        self.consume_for(self.client_id(context))
    }

    pub fn consume_for(&self, client_id: String) -> Result<ClientUsage> {
        let usage = self
            .tracker
            .try_record_usage(&client_id)
            .map_err(Error::QuotaExceeded)?;
        Ok(ClientUsage { client_id, usage })
    }
}
