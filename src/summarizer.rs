//! Length-tiered article summarization.
//!
//! The input is bounded before it reaches the provider: the token count is
//! estimated at a fixed characters-per-token ratio, and text over the budget is
//! cut to the equivalent number of characters. Trailing content may be lost.
//!
//! | Tier | Sentences | Max output tokens |
//! |------|-----------|-------------------|
//! | 1 ([`LengthTier::Brief`]) | 1-2 | 100 |
//! | 2 ([`LengthTier::Moderate`]) | 3-4 | 150 |
//! | 3 ([`LengthTier::Detailed`]) | 5-6 | 200 |
//!
//! Any other tier value maps to tier 2.

use crate::api::{AskAsync, ChatRequest};
use crate::config::SummarizerConfig;
use crate::error::SummarizationError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

/// Discrete summary-size setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum LengthTier {
    Brief,
    #[default]
    Moderate,
    Detailed,
}

impl LengthTier {
    pub fn sentence_range(self) -> &'static str {
        match self {
            LengthTier::Brief => "1-2",
            LengthTier::Moderate => "3-4",
            LengthTier::Detailed => "5-6",
        }
    }

    pub fn max_output_tokens(self) -> u32 {
        match self {
            LengthTier::Brief => 100,
            LengthTier::Moderate => 150,
            LengthTier::Detailed => 200,
        }
    }
}

impl From<u8> for LengthTier {
    fn from(value: u8) -> Self {
        match value {
            1 => LengthTier::Brief,
            3 => LengthTier::Detailed,
            _ => LengthTier::Moderate,
        }
    }
}

impl From<LengthTier> for u8 {
    fn from(tier: LengthTier) -> Self {
        match tier {
            LengthTier::Brief => 1,
            LengthTier::Moderate => 2,
            LengthTier::Detailed => 3,
        }
    }
}

/// Approximate token count: characters divided by `chars_per_token`, rounded up.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}

/// Cut `text` to `max_tokens * chars_per_token` characters if its estimate
/// exceeds `max_tokens`. Text within budget is returned unchanged.
pub fn truncate_to_budget(text: &str, max_tokens: usize, chars_per_token: usize) -> &str {
    if estimate_tokens(text, chars_per_token) <= max_tokens {
        return text;
    }
    let max_chars = max_tokens.saturating_mul(chars_per_token.max(1));
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    &text[..cut]
}

/// Summarizes article text through an [`AskAsync`] client.
pub struct Summarizer<'a> {
    client: &'a dyn AskAsync,
    config: &'a SummarizerConfig,
}

impl<'a> Summarizer<'a> {
    pub fn new(client: &'a dyn AskAsync, config: &'a SummarizerConfig) -> Self {
        Self { client, config }
    }

    /// Build the provider request for `text` at `tier`, applying the input budget.
    pub fn build_request(&self, text: &str, tier: LengthTier) -> ChatRequest {
        let input = truncate_to_budget(text, self.config.max_input_tokens, self.config.chars_per_token);
        if input.len() < text.len() {
            warn!(
                estimated_tokens = estimate_tokens(text, self.config.chars_per_token),
                budget = self.config.max_input_tokens,
                "Article exceeds input budget; truncating"
            );
        }
        ChatRequest {
            model: self.config.model.clone(),
            system: self.config.system_prompt.clone(),
            user: format!(
                "Please provide a {} sentence summary of this article:\n\n{}",
                tier.sentence_range(),
                input
            ),
            max_tokens: tier.max_output_tokens(),
        }
    }

    /// Summarize `text` at `tier`.
    ///
    /// One attempt, no retries.
    ///
    /// # Arguments
    ///
    /// * `text` - article body; cut to the input budget first
    /// * `tier` - target sentence range and output-token cap
    ///
    /// # Errors
    ///
    /// Returns [`SummarizationError`] on any provider or transport failure, or
    /// when the model answers with blank text.
    #[instrument(level = "info", skip_all, fields(tier = u8::from(tier), chars = text.len()))]
    pub async fn summarize(&self, text: &str, tier: LengthTier) -> Result<String, SummarizationError> {
        let request = self.build_request(text, tier);
        let summary = self.client.ask(&request).await.map_err(|e| {
            error!(error = %e, "Summary generation failed");
            SummarizationError::from(e)
        })?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(SummarizationError::EmptySummary);
        }
        info!(chars = summary.len(), "Generated summary");
        Ok(summary.to_string())
    }
}
