//! Retrieval-augmented chat.
//!
//! [`RagAssembler::answer`] retrieves sources with a threshold looser than
//! interactive search, renders them into a numbered context block, and
//! sends one non-streaming completion request:
//!
//! ```text
//! system:  <fixed instruction>
//! ...      <history, roles coerced, empty turns dropped>
//! user:    User query:\n<query>\n\nRetrieved context:\n<context>
//! ```
//!
//! The sources returned alongside the answer are exactly the ones rendered
//! into the context, in rank order.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{LlmConfig, RagConfig};
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, TextGenerator};
use crate::models::ScoredAsset;
use crate::search::RetrievalEngine;

/// Substituted when the provider returns blank content.
pub const EMPTY_ANSWER: &str = "No response generated.";

/// A prior conversation turn as supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<ScoredAsset>,
}

/// Coerce a client role into `system`, `assistant`, or `user`.
pub fn normalize_role(role: &str) -> &'static str {
    match role.trim().to_lowercase().as_str() {
        "assistant" => "assistant",
        "system" => "system",
        _ => "user",
    }
}

/// Numbered context block, one paragraph per source.
pub fn build_context(sources: &[ScoredAsset]) -> String {
    let mut ctx = String::new();
    for (idx, src) in sources.iter().enumerate() {
        let _ = writeln!(
            ctx,
            "[{}] id={}, file={}, mime={}",
            idx + 1,
            src.id,
            src.file_name,
            src.mime_type
        );
        if let Some(caption) = src.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            let _ = writeln!(ctx, "caption: {}", caption);
        }
        if !src.content_preview.trim().is_empty() {
            let _ = writeln!(ctx, "text: {}", src.content_preview);
        }
        ctx.push('\n');
    }
    ctx
}

/// Full message list: system prompt, cleaned history, then the query with
/// its context.
pub fn build_messages(
    system_prompt: &str,
    history: &[HistoryTurn],
    query: &str,
    context: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new("system", system_prompt));
    for turn in history {
        let content = turn.content.trim();
        if content.is_empty() {
            continue;
        }
        messages.push(ChatMessage::new(normalize_role(&turn.role), content));
    }
    messages.push(ChatMessage::new(
        "user",
        format!("User query:\n{}\n\nRetrieved context:\n{}", query, context),
    ));
    messages
}

pub struct RagAssembler {
    retrieval: Arc<RetrievalEngine>,
    generator: Arc<dyn TextGenerator>,
    rag: RagConfig,
    llm: LlmConfig,
}

impl RagAssembler {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        generator: Arc<dyn TextGenerator>,
        rag: RagConfig,
        llm: LlmConfig,
    ) -> Self {
        Self {
            retrieval,
            generator,
            rag,
            llm,
        }
    }

    /// Map a requested top-k into `[1, max_top_k]`; non-positive means the
    /// default.
    pub fn clamp_top_k(&self, top_k: i64) -> i64 {
        let k = if top_k <= 0 {
            self.rag.default_top_k
        } else {
            top_k
        };
        k.clamp(1, self.rag.max_top_k.max(1))
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[HistoryTurn],
        top_k: i64,
    ) -> Result<RagAnswer> {
        self.answer_at(query, history, top_k, Utc::now()).await
    }

    pub async fn answer_at(
        &self,
        query: &str,
        history: &[HistoryTurn],
        top_k: i64,
        now: DateTime<Utc>,
    ) -> Result<RagAnswer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidRequest("query is required".to_string()));
        }
        let top_k = self.clamp_top_k(top_k);

        let outcome = self
            .retrieval
            .search_at(query, top_k, self.rag.threshold, now)
            .await?;
        let sources = outcome.results;

        let context = build_context(&sources);
        let request = CompletionRequest {
            model: self.llm.model.clone(),
            messages: build_messages(&self.rag.system_prompt, history, query, &context),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            top_p: self.llm.top_p,
            stream: false,
        };

        let raw = self.generator.complete(&request).await.map_err(|e| {
            warn!(status = ?e.status, "synthesis failed");
            Error::Synthesis {
                status: e.status,
                body: e.body,
            }
        })?;

        let trimmed = raw.trim();
        let answer = if trimmed.is_empty() {
            EMPTY_ANSWER.to_string()
        } else {
            trimmed.to_string()
        };

        info!(
            sources = sources.len(),
            messages = request.messages.len(),
            "chat answered"
        );
        Ok(RagAnswer { answer, sources })
    }
}
