//! Request-scoped query and chat engines.
//!
//! Both borrow the index store and the generation handle, so an engine
//! cannot outlive a model swap. Build a fresh one per request.

use serde::Serialize;
use tracing::debug;

use ragstudio_core::models::chat::{ChatMessage, ChatRole};
use ragstudio_core::models::node::ScoredNode;
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::models::settings::{ChatPrompts, QueryPrompts};
use ragstudio_core::prompts::render;
use ragstudio_core::runtime::GenerationModel;

use crate::error::SearchError;
use crate::store::KnowledgeIndexStore;
use crate::vectors::{FlatVectorIndex, VectorIndex};

pub const DEFAULT_SIMILARITY_TOP_K: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub response: String,
    pub source_nodes: Vec<SourceNode>,
}

/// A retrieved node as reported back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceNode {
    pub text: String,
    pub score: f32,
    pub file_name: Option<String>,
}

impl From<ScoredNode> for SourceNode {
    fn from(scored: ScoredNode) -> Self {
        Self {
            text: scored.node.text,
            score: scored.score,
            file_name: scored.node.metadata.file_name,
        }
    }
}

/// Single-shot question answering: text-QA over the best node, then
/// refine over each further node.
pub struct QueryEngine<'a, V = FlatVectorIndex> {
    store: &'a KnowledgeIndexStore<V>,
    llm: &'a dyn GenerationModel,
    prompts: QueryPrompts,
    similarity_top_k: usize,
    sampling: SamplingParams,
}

impl<'a, V: VectorIndex> QueryEngine<'a, V> {
    pub fn new(
        store: &'a KnowledgeIndexStore<V>,
        llm: &'a dyn GenerationModel,
        prompts: QueryPrompts,
        similarity_top_k: usize,
    ) -> Self {
        Self {
            store,
            llm,
            prompts,
            similarity_top_k,
            sampling: SamplingParams::default(),
        }
    }

    /// Sampling applied to every answer the engine generates.
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub async fn query(&self, query: &str) -> Result<Response, SearchError> {
        let nodes = self.store.retrieve(query, self.similarity_top_k).await?;
        debug!(retrieved = nodes.len(), "query retrieval");

        let mut contexts = nodes.iter().map(|n| n.node.text.as_str());
        let first = contexts.next().unwrap_or_default();
        let prompt = render(&self.prompts.text_qa_template, &[
            ("context_str", first),
            ("query_str", query),
        ]);
        let mut answer = self.llm.complete(&prompt, &self.sampling).await?;

        for context in contexts {
            let prompt = render(&self.prompts.refine_template, &[
                ("query_str", query),
                ("existing_answer", answer.as_str()),
                ("context_msg", context),
            ]);
            answer = self.llm.complete(&prompt, &self.sampling).await?;
        }

        Ok(Response {
            response: answer,
            source_nodes: nodes.into_iter().map(SourceNode::from).collect(),
        })
    }
}

/// Condense-plus-context chat: rewrite the follow-up into a standalone
/// question, retrieve with it, and answer with the retrieved context as
/// the system message.
pub struct ChatEngine<'a, V = FlatVectorIndex> {
    store: &'a KnowledgeIndexStore<V>,
    llm: &'a dyn GenerationModel,
    prompts: ChatPrompts,
    similarity_top_k: usize,
    sampling: SamplingParams,
}

impl<'a, V: VectorIndex> ChatEngine<'a, V> {
    pub fn new(
        store: &'a KnowledgeIndexStore<V>,
        llm: &'a dyn GenerationModel,
        prompts: ChatPrompts,
        similarity_top_k: usize,
    ) -> Self {
        Self {
            store,
            llm,
            prompts,
            similarity_top_k,
            sampling: SamplingParams::default(),
        }
    }

    /// Sampling applied to every answer the engine generates.
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub async fn chat(&self, message: &str, history: &[ChatMessage]) -> Result<Response, SearchError> {
        let question = self.condense(message, history).await?;
        let nodes = self.store.retrieve(&question, self.similarity_top_k).await?;
        debug!(retrieved = nodes.len(), condensed = question.as_str() != message, "chat retrieval");

        let context = nodes
            .iter()
            .map(|n| n.node.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let system = render(&self.prompts.context_prompt, &[("context_str", context.as_str())]);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().filter(|m| m.role != ChatRole::System).cloned());
        messages.push(ChatMessage::user(message));

        let answer = self.llm.chat(&messages, &self.sampling).await?;
        Ok(Response {
            response: answer,
            source_nodes: nodes.into_iter().map(SourceNode::from).collect(),
        })
    }

    async fn condense(&self, message: &str, history: &[ChatMessage]) -> Result<String, SearchError> {
        if history.is_empty() {
            return Ok(message.to_string());
        }
        let chat_history = format_history(history);
        let prompt = render(&self.prompts.condense_prompt, &[
            ("chat_history", chat_history.as_str()),
            ("question", message),
        ]);
        // The rewrite is internal; caller limits such as max_tokens apply to the answer only.
        let condensed = self.llm.complete(&prompt, &SamplingParams::default()).await?;
        let condensed = condensed.trim();
        Ok(if condensed.is_empty() {
            message.to_string()
        } else {
            condensed.to_string()
        })
    }
}

fn format_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
