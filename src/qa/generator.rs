//! Answer-generation boundary.
//!
//! The core never generates text itself; it hands ranked context chunks to
//! an [`AnswerGenerator`] and takes whatever prose comes back. The shipped
//! implementation talks to an OpenAI-compatible chat-completions endpoint
//! with a blocking HTTP client.

use serde::Deserialize;

use crate::config::LlmConfig;
use crate::retrieval::SearchResult;

/// Results below this relevance score are left out of the prompt context
/// and are not counted as sources.
pub const RELEVANT_SOURCE_CUTOFF: f32 = 0.3;

/// Produces a natural-language answer from a question and ranked context.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, question: &str, results: &[SearchResult]) -> anyhow::Result<String>;

    fn name(&self) -> &'static str;
}

/// Assemble the prompt context from search results, keeping only results
/// above the relevance cutoff.
pub fn build_context(results: &[SearchResult]) -> String {
    let mut parts = Vec::new();
    for (i, result) in results.iter().enumerate() {
        if result.relevance_score > RELEVANT_SOURCE_CUTOFF {
            parts.push(format!("Context {}:\n{}\n", i + 1, result.content));
        }
    }
    parts.join("\n")
}

/// Number of results that clear the relevance cutoff.
pub fn count_sources(results: &[SearchResult]) -> usize {
    results
        .iter()
        .filter(|r| r.relevance_score > RELEVANT_SOURCE_CUTOFF)
        .count()
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsGenerator {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    site_name: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatCompletionsGenerator {
    /// Build a client from config; the API key comes from the environment
    /// variable named in the config, never from the config file itself.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "{} is not set; export it to enable answer generation",
                config.api_key_env
            )
        })?;

        Ok(Self {
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            site_name: config.site_name.clone(),
            client: reqwest::blocking::Client::new(),
        })
    }

    fn prompt(&self, question: &str, results: &[SearchResult]) -> String {
        let context = build_context(results);

        format!(
            "You are a helpful customer service assistant for {site}.\n\n\
             Based on the following context information, answer the user's question accurately and helpfully.\n\n\
             CONTEXT:\n{context}\n\n\
             USER QUESTION: {question}\n\n\
             INSTRUCTIONS:\n\
             1. Answer based primarily on the provided context\n\
             2. Be specific and helpful\n\
             3. If the context doesn't contain enough information, say so politely\n\
             4. Keep the tone friendly and professional\n\
             5. If asked about features, pricing, or processes, be as specific as possible\n\
             6. For account-related queries, guide the user to contact support if needed\n\n\
             ANSWER:",
            site = self.site_name,
        )
    }
}

impl AnswerGenerator for ChatCompletionsGenerator {
    fn generate(&self, question: &str, results: &[SearchResult]) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": self.prompt(question, results) }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?
            .error_for_status()?;

        let completion: ChatCompletionResponse = response.json()?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no choices"))
    }

    fn name(&self) -> &'static str {
        "chat-completions"
    }
}
